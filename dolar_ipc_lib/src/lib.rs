//! Library layer for the dollar/CPI pipeline: snapshot files, SQLite history
//! table, anomaly scan, retry policy and the per-source pipeline runner.
//!
//! Wraps the `datosgob_api` crate, which only knows how to fetch a series.

pub mod anomaly;
pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod retry;
pub mod snapshot;

pub use datosgob_api;
pub use datosgob_api::types;
pub use datosgob_api::{Client, DateWindow, EndpointSpec};

pub use anomaly::AnomalyReport;
pub use config::{Config, ConfigError, DbConfig, PipelineSettings, SourceConfig};
pub use db::{Db, LoadOutcome};
pub use error::{FailureKind, PipelineError};
pub use pipeline::{PipelineRunner, RunContext, RunSummary, SourceOutcome, Stage};
pub use retry::{FixedDelay, NoRetry, RetryPolicy};
pub use snapshot::{Snapshot, SnapshotRow};
