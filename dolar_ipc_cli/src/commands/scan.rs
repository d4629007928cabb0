//! The `scan` subcommand: report anomalous dollar quotes.

use anyhow::{bail, Result};
use clap::Args;
use dolar_ipc_lib::pipeline::StoreSettings;
use dolar_ipc_lib::Config;

use super::table_name;
use crate::output::{print_anomaly_table, print_json, OutputFormat};

/// Arguments for the `scan` subcommand.
#[derive(Args)]
pub struct ScanArgs {
    /// Report quotes strictly above this value (defaults to the configured threshold)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// History table (defaults to the configured table)
    #[arg(long)]
    pub table: Option<String>,
}

pub fn run(args: &ScanArgs, config: &Config, format: &OutputFormat) -> Result<()> {
    let threshold = args.threshold.unwrap_or(config.pipeline.threshold);
    if !threshold.is_finite() {
        bail!("Invalid --threshold value: '{}'. Must be a finite number", threshold);
    }
    let table = table_name(args.table.as_deref(), config);

    let report = StoreSettings::from_config(config).scan(table, threshold)?;

    match format {
        OutputFormat::Table => print_anomaly_table(&report),
        OutputFormat::Json => print_json(&report),
    }
    Ok(())
}
