//! Remote schema fetching
//!
//! The compiler only sees the [`SchemaFetcher`] trait, so the transport can
//! be swapped (offline runs, tests, caching proxies) without touching the
//! compilation logic.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use url::Url;

/// Network-level failure while fetching a schema
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("remote resolution is disabled")]
    Disabled,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Network(String),
}

/// Fetches the raw bytes behind a schema URI
pub trait SchemaFetcher: Send + Sync {
    fn fetch(&self, uri: &Url) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher with a per-request timeout
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("datamodel-validator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl SchemaFetcher for HttpFetcher {
    fn fetch(&self, uri: &Url) -> Result<Vec<u8>, FetchError> {
        debug!(uri = %uri, "fetching remote schema");
        let response = self
            .client
            .get(uri.clone())
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Status(status.as_u16()));
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Network(e.to_string()))
    }
}

/// Refuses every request
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineFetcher;

impl SchemaFetcher for OfflineFetcher {
    fn fetch(&self, _uri: &Url) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Disabled)
    }
}

/// Serves schemas from memory, keyed by URI. Unknown URIs answer 404.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    responses: HashMap<String, Vec<u8>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the body served for `uri`
    pub fn with(mut self, uri: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(uri.to_string(), body.into());
        self
    }
}

impl SchemaFetcher for StaticFetcher {
    fn fetch(&self, uri: &Url) -> Result<Vec<u8>, FetchError> {
        self.responses
            .get(uri.as_str())
            .cloned()
            .ok_or(FetchError::Status(404))
    }
}
