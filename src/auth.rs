//! Authorization header support for storage requests

use std::fmt;

use http::HeaderValue;

use crate::{Error, Result};

/// Authorization scheme expected by the storage service.
///
/// The service does not accept `Bearer`; tokens are sent as
/// `Authorization: Firebase <token>`.
pub const STORAGE_AUTH_SCHEME: &str = "Firebase";

/// Credentials for the `Authorization` header of a storage request.
///
/// The header value is formatted as `<scheme> <credentials>`.
///
/// # Examples
///
/// ```rust
/// use stowage::Auth;
///
/// let auth = Auth::storage("id-token");
/// assert_eq!(auth.to_header_value(), "Firebase id-token");
///
/// let auth = Auth::custom("Token", "secret");
/// assert_eq!(auth.to_header_value(), "Token secret");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    scheme: String,
    credentials: String,
}

impl Auth {
    /// Create authentication using the storage service scheme.
    pub fn storage(token: impl Into<String>) -> Self {
        Self::custom(STORAGE_AUTH_SCHEME, token)
    }

    /// Create authentication with a custom scheme.
    ///
    /// # Arguments
    ///
    /// * `scheme` - The authentication scheme (e.g., "Firebase", "Token")
    /// * `credentials` - The credentials for the scheme
    pub fn custom(scheme: impl Into<String>, credentials: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            credentials: credentials.into(),
        }
    }

    /// The scheme name
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Generate the `Authorization` header value.
    pub fn to_header_value(&self) -> String {
        format!("{} {}", self.scheme, self.credentials)
    }

    /// Encode as a header value marked sensitive, so it is redacted from
    /// `Debug` output of the header map.
    pub(crate) fn header_value(&self) -> Result<HeaderValue> {
        let mut value =
            HeaderValue::from_str(&self.to_header_value()).map_err(|_| Error::InvalidHeader {
                name: http::header::AUTHORIZATION.to_string(),
            })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Display for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} authentication", self.scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_auth() {
        let auth = Auth::storage("token123");
        assert_eq!(auth.scheme(), "Firebase");
        assert_eq!(auth.to_header_value(), "Firebase token123");
    }

    #[test]
    fn test_custom_auth() {
        let auth = Auth::custom("ApiKey", "secret123");
        assert_eq!(auth.to_header_value(), "ApiKey secret123");
    }

    #[test]
    fn test_display_hides_credentials() {
        let auth = Auth::storage("very-secret");
        let shown = auth.to_string();
        assert_eq!(shown, "Firebase authentication");
        assert!(!shown.contains("very-secret"));
    }

    #[test]
    fn test_header_value_is_sensitive() {
        let value = Auth::storage("abc").header_value().unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().unwrap(), "Firebase abc");
    }

    #[test]
    fn test_header_value_rejects_newlines() {
        let result = Auth::storage("abc\ndef").header_value();
        assert!(matches!(result, Err(Error::InvalidHeader { .. })));
    }
}
