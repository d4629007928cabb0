//! CLI subcommand implementations.

pub mod fetch;
pub mod init;
pub mod load;
pub mod run;
pub mod scan;

use anyhow::{bail, Result};
use chrono::{NaiveDate, Timelike};
use clap::Args;
use dolar_ipc_lib::{Config, RunContext};

/// Logical date of a run. Defaults to the current UTC time.
#[derive(Args, Debug, Clone)]
pub struct LogicalDateArgs {
    /// Logical run date (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<String>,

    /// Logical run hour (0-23), used with --date
    #[arg(long, requires = "date")]
    pub hour: Option<u32>,
}

impl LogicalDateArgs {
    pub fn context(&self) -> Result<RunContext> {
        let Some(ref date) = self.date else {
            let now = RunContext::now();
            let truncated = now
                .logical_date
                .with_minute(0)
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0))
                .unwrap_or(now.logical_date);
            return Ok(RunContext::new(truncated));
        };
        let day = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(d) => d,
            Err(_) => bail!("Invalid --date value: '{}'. Expected YYYY-MM-DD", date),
        };
        let hour = self.hour.unwrap_or(0);
        match day.and_hms_opt(hour, 0, 0) {
            Some(logical_date) => Ok(RunContext::new(logical_date)),
            None => bail!("Invalid --hour value: '{}'. Must be between 0 and 23", hour),
        }
    }
}

/// Table override shared by the storage subcommands.
pub fn table_name<'a>(override_table: Option<&'a str>, config: &'a Config) -> &'a str {
    override_table.unwrap_or(&config.pipeline.table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(date: Option<&str>, hour: Option<u32>) -> LogicalDateArgs {
        LogicalDateArgs {
            date: date.map(str::to_string),
            hour,
        }
    }

    #[test]
    fn explicit_date_and_hour() {
        let ctx = args(Some("2023-03-01"), Some(6)).context().unwrap();
        assert_eq!(ctx.logical_date.to_string(), "2023-03-01 06:00:00");
    }

    #[test]
    fn hour_defaults_to_midnight() {
        let ctx = args(Some("2023-03-01"), None).context().unwrap();
        assert_eq!(ctx.logical_date.hour(), 0);
    }

    #[test]
    fn rejects_bad_date_and_hour() {
        assert!(args(Some("01/03/2023"), None).context().is_err());
        assert!(args(Some("2023-03-01"), Some(24)).context().is_err());
    }

    #[test]
    fn default_is_truncated_to_the_hour() {
        let ctx = args(None, None).context().unwrap();
        assert_eq!(ctx.logical_date.minute(), 0);
        assert_eq!(ctx.logical_date.second(), 0);
    }
}
