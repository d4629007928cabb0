//! HTTP client for the datos.gob.ar series API.

use std::time::Duration;

use url::Url;

use crate::{endpoint::EndpointSpec, types::SeriesPayload, Error};

/// Production host of the series API.
pub const DEFAULT_BASE_URL: &str = "https://apis.datos.gob.ar";

/// Request timeout applied to every call unless overridden.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the series API.
///
/// Holds one `reqwest::Client` for its lifetime so the connection pool is
/// shared by every source fetched through it.
pub struct Client {
    http: reqwest::Client,
    /// Base URL for the API. Defaults to `https://apis.datos.gob.ar`.
    base_api_url: String,
}

impl Client {
    /// Creates a new client pointing at the production API.
    pub fn new() -> Result<Self, Error> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str) -> Result<Self, Error> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                Error::Build(e.to_string())
            })?;
        Ok(Self {
            http,
            base_api_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_api_url
    }

    /// Full request URL for `spec`: `{base}/{endpoint}?{params}`.
    pub fn series_url(&self, spec: &EndpointSpec) -> Result<Url, Error> {
        let raw = format!(
            "{}/{}",
            self.base_api_url,
            spec.endpoint.trim_start_matches('/')
        );
        let url = Url::parse(&raw).map_err(|e| {
            tracing::error!("Invalid URL constructed: {}", e);
            Error::InvalidUrl(format!("{}: {}", raw, e))
        })?;
        Ok(spec.add_to_url(&url))
    }

    /// Issues a single GET for `spec` and returns the parsed envelope.
    pub async fn get_series(&self, spec: &EndpointSpec) -> Result<SeriesPayload, Error> {
        let url = self.series_url(spec)?;
        tracing::debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to get series {}: {}", spec.name, e);
                Error::Transient(e.to_string())
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            tracing::error!("Failed to read response body: {}", e);
            Error::Transient(e.to_string())
        })?;

        if !status.is_success() {
            let snippet = truncate_body(&body);
            tracing::error!("Request failed with status {}: {}", status, snippet);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: snippet,
            });
        }

        serde_json::from_str::<SeriesPayload>(&body).map_err(|e| {
            let snippet = truncate_body(&body);
            tracing::error!("Failed to parse series {}: {} | body: {}", spec.name, e, snippet);
            Error::Malformed(e.to_string())
        })
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    match body.char_indices().nth(MAX) {
        None => body.to_string(),
        Some((cut, _)) => format!("{}...[truncated]", &body[..cut]),
    }
}
