//! Error types and failure classification

use thiserror::Error;

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Placeholder stored in [`Error::UploadFailed`] when the failure happened
/// before any response text was read.
pub const NO_RESPONSE: &str = "N/A";

/// Error types for upload operations
#[derive(Debug, Error)]
pub enum Error {
    /// The operation was aborted by its cancellation token
    #[error("Upload was cancelled")]
    Cancelled,

    /// Any failure of an upload other than cancellation.
    ///
    /// Always carries the request URL and the raw response text (or
    /// [`NO_RESPONSE`]) so server-side diagnostics are not lost.
    #[error(
        "Exception occurred while processing the request.\nUrl: {url}\nResponse from server: {response_data}"
    )]
    UploadFailed {
        /// Target URL of the upload
        url: String,
        /// Raw response body, or [`NO_RESPONSE`]
        response_data: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Invalid URL
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL
        url: String,
    },

    /// A header name or value could not be encoded
    #[error("Invalid header: {name}")]
    InvalidHeader {
        /// Header name as supplied
        name: String,
    },

    /// Transport failure while sending or reading
    #[error("Network error: {source}")]
    Network {
        /// The underlying reqwest error
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Server answered with a non-success status
    #[error("Response status code does not indicate success: {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Response body was not the expected JSON document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response document had no download token
    #[error("Response did not contain a download token")]
    MissingDownloadToken,

    /// An auth-token or header provider failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map a reqwest error, separating timeouts from other transport failures
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Error::Timeout
        } else {
            Error::Network { source: error }
        }
    }

    /// Wrap a cause into [`Error::UploadFailed`]
    pub(crate) fn upload_failed(
        url: impl Into<String>,
        response_data: impl Into<String>,
        source: Error,
    ) -> Self {
        Error::UploadFailed {
            url: url.into(),
            response_data: response_data.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Target URL of a failed upload
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::UploadFailed { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Raw server response captured by a failed upload
    pub fn response_data(&self) -> Option<&str> {
        match self {
            Error::UploadFailed { response_data, .. } => Some(response_data),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_failed_display() {
        let error = Error::upload_failed(
            "https://x/upload",
            r#"{"error":"forbidden"}"#,
            Error::Status { status: 403 },
        );
        let msg = error.to_string();
        assert!(msg.contains("https://x/upload"), "Expected URL in: {msg}");
        assert!(msg.contains(r#"{"error":"forbidden"}"#), "Expected body in: {msg}");
    }

    #[test]
    fn test_upload_failed_accessors() {
        let error = Error::upload_failed("https://x/upload", NO_RESPONSE, Error::Timeout);
        assert_eq!(error.url(), Some("https://x/upload"));
        assert_eq!(error.response_data(), Some("N/A"));
        assert!(!error.is_cancelled());

        let source = std::error::Error::source(&error).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Request timed out"));
    }

    #[test]
    fn test_cancelled_has_no_upload_context() {
        let error = Error::Cancelled;
        assert!(error.is_cancelled());
        assert_eq!(error.url(), None);
        assert_eq!(error.response_data(), None);
    }
}
