//! Shared HTTP transport backed by reqwest

use std::time::Duration;

use http::HeaderMap;

use crate::request::Request;
use crate::response::Response;
use crate::upload::UploadBuilder;
use crate::{Error, Result};

/// Default request timeout, matching common platform HTTP client defaults
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Configuration for transport creation
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Request timeout
    pub timeout: Option<Duration>,
    /// Connect timeout
    pub connect_timeout: Option<Duration>,
    /// User agent string
    pub user_agent: Option<String>,
    /// Default headers to add to all requests
    pub default_headers: Option<HeaderMap>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            connect_timeout: None,
            user_agent: None,
            default_headers: None,
        }
    }
}

/// HTTP transport shared by many upload tasks.
///
/// Cloning is cheap and every clone uses the same connection pool. Tasks
/// only borrow it to send requests; they never reconfigure it.
#[derive(Clone, Debug)]
pub struct Transport {
    client: reqwest::Client,
}

impl Transport {
    /// Create a transport with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(TransportConfig::default())
    }

    /// Create a transport with configuration
    pub fn with_config(config: TransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        if let Some(user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent);
        }

        if let Some(default_headers) = config.default_headers {
            builder = builder.default_headers(default_headers);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create reqwest client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Start configuring an upload to `url`
    pub fn upload(&self, url: impl Into<String>) -> UploadBuilder {
        UploadBuilder::new(self.clone(), url)
    }

    /// Execute a request
    pub async fn execute(&self, request: Request) -> Result<Response> {
        tracing::debug!(method = %request.method, url = %request.url, "sending request");

        let mut req_builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            req_builder = req_builder.body(body.into_body());
        }

        let response = req_builder.send().await.map_err(Error::from_reqwest)?;
        Ok(Response::new(response))
    }

    /// Get the underlying reqwest client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.timeout, Some(Duration::from_secs(100)));
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn test_with_config() {
        let mut headers = HeaderMap::new();
        headers.insert("x-client", "stowage".parse().unwrap());
        let transport = Transport::with_config(TransportConfig {
            timeout: Some(Duration::from_secs(5)),
            connect_timeout: Some(Duration::from_secs(1)),
            user_agent: Some("stowage-test/1.0".to_string()),
            default_headers: Some(headers),
        });
        assert!(transport.is_ok());
    }
}
