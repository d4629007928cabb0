//! Error types for the series API client.

/// Errors that can occur when requesting a series.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request never produced a response (connection refused, DNS, timeout).
    #[error("Request failed: {0}")]
    Transient(String),
    /// The API returned a non-success status with a body snippet.
    #[error("Request failed with status {status}")]
    HttpStatus { status: u16, body: String },
    /// The body was not JSON or did not carry the `data` envelope.
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// The base URL and endpoint path do not form a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// The HTTP client itself could not be constructed (TLS backend, resolver).
    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl Error {
    /// Whether repeating the same request later may succeed.
    ///
    /// Network failures, 5xx and 429 are retryable. Any other status or a body
    /// that does not match the envelope is a contract violation upstream.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::InvalidUrl(_) | Self::Build(_) => false,
        }
    }
}
