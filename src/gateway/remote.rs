//! # Remote Source
//!
//! The seam between the core and the network. A [`RemoteSource`] performs one
//! idempotent read and reports either the upstream's answer (any status) or a
//! transport failure. Status interpretation happens in the fetch pipeline.
//!
//! [`HttpRemote`] is the `reqwest` implementation used in production; tests
//! substitute in-process fakes.

use crate::core::error::{IntelError, IntelResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Status and decoded body of one upstream answer
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    /// JSON body, or the raw text as a JSON string when it is not JSON
    pub body: Value,
}

impl RemoteResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }
}

/// Transport-level failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The endpoint could not be turned into a URL; retrying cannot help
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl From<RemoteError> for IntelError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Connection(message) => IntelError::Connection { message },
            RemoteError::Timeout(after) => IntelError::Timeout {
                timeout_ms: after.as_millis() as u64,
            },
            invalid @ RemoteError::InvalidEndpoint { .. } => IntelError::config(invalid.to_string()),
        }
    }
}

/// One upstream read
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Perform a read of `endpoint` with query `params`
    async fn call(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<RemoteResponse, RemoteError>;
}

/// HTTP implementation on top of `reqwest`
///
/// Relative endpoints are joined onto the base URL; absolute `http(s)://`
/// endpoints are used as-is, which lets one client reach both the Web API and
/// the community pages.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    api_key: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> IntelResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| IntelError::config(format!("Invalid base URL '{}': {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("achievement-intel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IntelError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            timeout,
            api_key: None,
        })
    }

    /// Send `key=<api_key>` with every request that does not carry one
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    fn resolve(&self, endpoint: &str) -> Result<Url, RemoteError> {
        let resolved = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Url::parse(endpoint)
        } else {
            self.base_url.join(endpoint.trim_start_matches('/'))
        };
        resolved.map_err(|e| RemoteError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn call(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<RemoteResponse, RemoteError> {
        let url = self.resolve(endpoint)?;

        let mut query: Vec<(&str, &str)> = params
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        if let Some(key) = &self.api_key {
            if !params.contains_key("key") {
                query.push(("key", key.as_str()));
            }
        }

        let timeout = self.timeout;
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                RemoteError::Timeout(timeout)
            } else {
                RemoteError::Connection(e.to_string())
            }
        };

        let response = self
            .client
            .get(url.clone())
            .query(&query)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(classify)?;
        debug!(url = %url, status, bytes = text.len(), "Upstream responded");

        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(RemoteResponse { status, body })
    }
}
