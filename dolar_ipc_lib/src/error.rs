//! Error taxonomy shared by every pipeline stage.

use std::fmt;
use std::path::PathBuf;

use rusqlite::ErrorCode;
use serde::Serialize;

use crate::config::ConfigError;

/// Errors raised by the fetch, load and scan stages.
///
/// Each variant maps to a [`FailureKind`]; only [`PipelineError::is_retryable`]
/// failures are worth handing back to the scheduler for another attempt.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// Network or timeout failure talking to the series API.
    #[error("transient fetch error: {0}")]
    TransientFetch(#[source] datosgob_api::Error),
    /// The API answered but the body broke the `{ "data": [...] }` contract.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// A snapshot file does not match the canonical columns and types.
    #[error("validation error: {0}")]
    Validation(String),
    /// The history table could not be created or has an incompatible layout.
    #[error("schema error: {0}")]
    Schema(String),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// Reading or writing the snapshot file failed.
    #[error("snapshot error at {}: {message}", .path.display())]
    Snapshot { path: PathBuf, message: String },
    /// A blocking task was cancelled or panicked.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Distinguishable failure class, reported per source.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TransientFetch,
    MalformedResponse,
    Validation,
    Schema,
    Configuration,
    Storage,
    Snapshot,
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::TransientFetch => "transient_fetch",
            Self::MalformedResponse => "malformed_response",
            Self::Validation => "validation",
            Self::Schema => "schema",
            Self::Configuration => "configuration",
            Self::Storage => "storage",
            Self::Snapshot => "snapshot",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::TransientFetch(_) => FailureKind::TransientFetch,
            Self::MalformedResponse(_) => FailureKind::MalformedResponse,
            Self::Validation(_) => FailureKind::Validation,
            Self::Schema(_) => FailureKind::Schema,
            Self::Configuration(_) => FailureKind::Configuration,
            Self::Storage(_) => FailureKind::Storage,
            Self::Snapshot { .. } => FailureKind::Snapshot,
            Self::Internal(_) => FailureKind::Internal,
        }
    }

    /// Whether the scheduler should run the failed stage again.
    ///
    /// Transient fetch failures always are. Storage failures only when SQLite
    /// reports the database as busy or locked by a concurrent writer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientFetch(_) => true,
            Self::Storage(e) => is_busy(e),
            _ => false,
        }
    }

    pub(crate) fn snapshot(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Snapshot {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub(crate) fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

impl From<datosgob_api::Error> for PipelineError {
    fn from(e: datosgob_api::Error) -> Self {
        if e.is_retryable() {
            Self::TransientFetch(e)
        } else {
            match e {
                datosgob_api::Error::HttpStatus { status, body } => {
                    Self::MalformedResponse(format!("HTTP {}: {}", status, body))
                }
                datosgob_api::Error::Build(msg) => Self::Internal(format!("HTTP client: {}", msg)),
                other => Self::MalformedResponse(other.to_string()),
            }
        }
    }
}
