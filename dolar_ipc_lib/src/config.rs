//! Configuration file loading.
//!
//! The file is TOML with named sections. The database section (its name is
//! chosen by the caller, `database` by default) carries the connection keys
//! `host`, `port`, `db`, `user` and `pwd`. `[pipeline]` and `[[sources]]` are
//! optional and fall back to the built-in defaults: the dollar quote and CPI
//! series from `apis.datos.gob.ar`, table `hist_dolar_ipc`, threshold 1000.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use datosgob_api::types::Column;
use datosgob_api::{DateWindow, EndpointSpec};
use serde::Deserialize;

use crate::db::validate_table_name;
use crate::snapshot::snapshot_path;

pub const DEFAULT_SECTION: &str = "database";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("configuration file '{}' does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read configuration file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("configuration section [{0}] is missing")]
    MissingSection(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a run needs, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    pub pipeline: PipelineSettings,
    pub sources: Vec<SourceConfig>,
}

/// Connection parameters from the database section.
///
/// The history table lives in SQLite, so `db` is the database file. The
/// remaining keys are still required and validated so one file can describe
/// the same deployment for every consumer.
#[derive(Deserialize, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub db: String,
    pub user: String,
    pub pwd: String,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("user", &self.user)
            .field("pwd", &"***")
            .finish()
    }
}

impl DbConfig {
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.db)
    }

    /// `user@host:port/db`, safe to log.
    pub fn label(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.db)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("host", &self.host),
            ("db", &self.db),
            ("user", &self.user),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "database key '{}' must not be empty",
                    key
                )));
            }
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("database port must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Settings shared by every source of a run.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PipelineSettings {
    pub base_url: String,
    pub table: String,
    /// Dollar quotes strictly above this value are reported as anomalies.
    pub threshold: f64,
    /// Root directory for snapshot files.
    pub data_dir: PathBuf,
    pub max_retries: usize,
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub busy_timeout_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            base_url: datosgob_api::DEFAULT_BASE_URL.to_string(),
            table: "hist_dolar_ipc".to_string(),
            threshold: 1000.0,
            data_dir: PathBuf::from("data"),
            max_retries: 3,
            retry_delay_secs: 300,
            request_timeout_secs: 30,
            busy_timeout_ms: 5000,
        }
    }
}

impl PipelineSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_table_name(&self.table).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !self.threshold.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "threshold must be a finite number, got {}",
                self.threshold
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// One remote series to fetch.
#[derive(Deserialize, Debug, Clone)]
pub struct SourceConfig {
    /// Unique name; also the snapshot subdirectory.
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Canonical columns carried by each payload row, `Fecha` first.
    pub columns: Vec<Column>,
}

impl SourceConfig {
    fn new(name: &str, params: &[(&str, &str)], columns: &[Column]) -> Self {
        Self {
            name: name.to_string(),
            endpoint: "series/api/series".to_string(),
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            columns: columns.to_vec(),
        }
    }

    /// Endpoint for the run at `logical_date`: static params plus the
    /// previous-month window, snapshot under `data_dir`.
    pub fn endpoint_spec(&self, data_dir: &Path, logical_date: NaiveDateTime) -> EndpointSpec {
        let window = DateWindow::previous_month(logical_date.date());
        let save_path = snapshot_path(data_dir, &self.name, logical_date);
        let mut spec = EndpointSpec::new(&self.name, &self.endpoint, self.columns.clone(), save_path);
        for (key, value) in &self.params {
            spec = spec.with_param(key, value);
        }
        spec.with_window(&window)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let name_ok = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !name_ok {
            return Err(ConfigError::Invalid(format!(
                "source name '{}' may only contain ASCII letters, digits, '_' and '-'",
                self.name
            )));
        }
        if self.columns.first() != Some(&Column::Fecha) {
            return Err(ConfigError::Invalid(format!(
                "source '{}': the first column must be Fecha",
                self.name
            )));
        }
        if self.columns.len() < 2 {
            return Err(ConfigError::Invalid(format!(
                "source '{}' must carry at least one indicator column",
                self.name
            )));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(*column) {
                return Err(ConfigError::Invalid(format!(
                    "source '{}' lists column {} twice",
                    self.name, column
                )));
            }
        }
        Ok(())
    }
}

/// The two built-in series: the monthly dollar quote and six CPI indicators.
pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig::new(
            "dolar",
            &[
                ("ids", "92.1_TCV_0_0_21"),
                ("header", "titles"),
                ("collapse", "month"),
                ("sort", "asc"),
                ("format", "json"),
            ],
            &[Column::Fecha, Column::CotizacionDolar],
        ),
        SourceConfig::new(
            "ipc",
            &[
                (
                    "ids",
                    "101.1_I2NG_2016_M_22,101.1_I2NG_2016_M_22:percent_change,101.1_I2AMS_2016_M_30,101.1_I2ED_2016_M_13,101.1_I2AB_2016_M_26,101.1_I2TC_2016_M_19",
                ),
                ("sort", "asc"),
                ("format", "json"),
            ],
            &[
                Column::Fecha,
                Column::IpcGral,
                Column::VarPorcIpcGral,
                Column::IpcSalud,
                Column::IpcEducacion,
                Column::IpcAlimentosBebidas,
                Column::IpcTransporte,
            ],
        ),
    ]
}

impl Config {
    /// Reads and validates the configuration file. A missing file is fatal.
    pub fn load(path: impl AsRef<Path>, section: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text, section)?;
        tracing::debug!(
            "Loaded configuration from {} ({} sources, database {})",
            path.display(),
            config.sources.len(),
            config.database.label()
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str, section: &str) -> Result<Self, ConfigError> {
        let mut table: toml::Table = text.parse()?;

        let database: DbConfig = table
            .remove(section)
            .ok_or_else(|| ConfigError::MissingSection(section.to_string()))?
            .try_into()?;
        let pipeline: PipelineSettings = table
            .remove("pipeline")
            .map(|v| v.try_into())
            .transpose()?
            .unwrap_or_default();
        let sources: Vec<SourceConfig> = table
            .remove("sources")
            .map(|v| v.try_into())
            .transpose()?
            .unwrap_or_else(default_sources);

        let config = Self {
            database,
            pipeline,
            sources,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.pipeline.validate()?;
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("no sources configured".to_string()));
        }
        let mut names = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
        }
        Ok(())
    }

    /// Sources whose name is in `names`; all of them when `names` is empty.
    pub fn select_sources(&self, names: &[String]) -> Result<Vec<SourceConfig>, ConfigError> {
        if names.is_empty() {
            return Ok(self.sources.clone());
        }
        names
            .iter()
            .map(|name| {
                self.sources
                    .iter()
                    .find(|s| &s.name == name)
                    .cloned()
                    .ok_or_else(|| ConfigError::Invalid(format!("unknown source '{}'", name)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const MINIMAL: &str = r#"
[database]
host = "localhost"
port = 5432
db = "hist.db"
user = "etl"
pwd = "s3cret"
"#;

    #[test]
    fn minimal_file_uses_builtin_defaults() {
        let config = Config::from_toml_str(MINIMAL, DEFAULT_SECTION).unwrap();
        assert_eq!(config.database.db, "hist.db");
        assert_eq!(config.pipeline.table, "hist_dolar_ipc");
        assert_eq!(config.pipeline.threshold, 1000.0);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.pipeline.retry_delay(), Duration::from_secs(300));
        let names: Vec<_> = config.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["dolar", "ipc"]);
    }

    #[test]
    fn named_section_is_selectable() {
        let text = MINIMAL.replace("[database]", "[postgres]");
        assert!(matches!(
            Config::from_toml_str(&text, DEFAULT_SECTION),
            Err(ConfigError::MissingSection(ref s)) if s == "database"
        ));
        assert!(Config::from_toml_str(&text, "postgres").is_ok());
    }

    #[test]
    fn missing_key_is_rejected() {
        let text = MINIMAL.replace("pwd = \"s3cret\"\n", "");
        assert!(matches!(
            Config::from_toml_str(&text, DEFAULT_SECTION),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = Config::load("/definitely/not/here/config.toml", DEFAULT_SECTION).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let config = Config::from_toml_str(MINIMAL, DEFAULT_SECTION).unwrap();
        let debug = format!("{:?}", config.database);
        assert!(!debug.contains("s3cret"));
        assert_eq!(config.database.label(), "etl@localhost:5432/hist.db");
    }

    #[test]
    fn custom_sources_and_settings() {
        let text = format!(
            r#"{MINIMAL}
[pipeline]
table = "hist_test"
threshold = 850.5
data_dir = "/tmp/snapshots"

[[sources]]
name = "dolar_blue"
endpoint = "series/api/series"
columns = ["Fecha", "Cotizacion_Dolar"]

[sources.params]
ids = "168.1_T_CAMBIOR_D_0_0_26"
format = "json"
"#
        );
        let config = Config::from_toml_str(&text, DEFAULT_SECTION).unwrap();
        assert_eq!(config.pipeline.table, "hist_test");
        assert_eq!(config.pipeline.threshold, 850.5);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].params["ids"], "168.1_T_CAMBIOR_D_0_0_26");
    }

    #[test]
    fn rejects_injected_table_name() {
        let text = format!("{MINIMAL}\n[pipeline]\ntable = \"hist; DROP TABLE x\"\n");
        assert!(matches!(
            Config::from_toml_str(&text, DEFAULT_SECTION),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_source_without_leading_fecha() {
        let text = format!(
            "{MINIMAL}\n[[sources]]\nname = \"x\"\nendpoint = \"s\"\ncolumns = [\"Cotizacion_Dolar\", \"Fecha\"]\n"
        );
        assert!(matches!(
            Config::from_toml_str(&text, DEFAULT_SECTION),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_duplicate_source_names() {
        let source = "[[sources]]\nname = \"x\"\nendpoint = \"s\"\ncolumns = [\"Fecha\", \"IPC_Gral\"]\n";
        let text = format!("{MINIMAL}\n{source}{source}");
        assert!(matches!(
            Config::from_toml_str(&text, DEFAULT_SECTION),
            Err(ConfigError::Invalid(ref m)) if m.contains("duplicate")
        ));
    }

    #[test]
    fn endpoint_spec_carries_window_and_path() {
        let config = Config::from_toml_str(MINIMAL, DEFAULT_SECTION).unwrap();
        let logical = NaiveDate::from_ymd_opt(2023, 3, 1)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let spec = config.sources[0].endpoint_spec(Path::new("data"), logical);
        assert_eq!(spec.param("start_date"), Some("2023-02-01T00:00:00Z"));
        assert_eq!(spec.param("end_date"), Some("2023-02-28T23:59:59Z"));
        assert_eq!(spec.param("ids"), Some("92.1_TCV_0_0_21"));
        assert_eq!(spec.save_path, PathBuf::from("data/dolar/2023-03-01/6_hour.csv"));
    }

    #[test]
    fn select_sources_by_name() {
        let config = Config::from_toml_str(MINIMAL, DEFAULT_SECTION).unwrap();
        assert_eq!(config.select_sources(&[]).unwrap().len(), 2);
        let picked = config.select_sources(&["ipc".to_string()]).unwrap();
        assert_eq!(picked[0].name, "ipc");
        assert!(config.select_sources(&["nope".to_string()]).is_err());
    }
}
