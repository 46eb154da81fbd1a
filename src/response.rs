//! Response handling

use http::{HeaderMap, StatusCode};

use crate::{Error, Result};

/// HTTP response
#[derive(Debug)]
pub struct Response {
    inner: reqwest::Response,
}

impl Response {
    pub(crate) fn new(inner: reqwest::Response) -> Self {
        Self { inner }
    }

    /// Get the response status code
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Check if the response status indicates success (2xx)
    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    /// Get all headers
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Consume the response and return the body as text
    pub async fn text(self) -> Result<String> {
        self.inner.text().await.map_err(Error::from_reqwest)
    }
}
