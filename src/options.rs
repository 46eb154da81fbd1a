//! Per-upload options: credential and header providers

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use crate::Result;
use crate::auth::{Auth, STORAGE_AUTH_SCHEME};
use crate::progress::DEFAULT_PROGRESS_INTERVAL;

/// Async function producing an auth token, or `None` for anonymous requests
pub type AuthTokenProvider =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Option<String>>> + Send + Sync>;

/// Async function producing extra `(name, value)` request headers
pub type HeadersProvider =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Vec<(String, String)>>> + Send + Sync>;

/// Options shared by every request of an upload.
///
/// Options are cheap to clone and immutable once handed to a task.
///
/// # Examples
///
/// ```rust
/// use stowage::UploadOptions;
///
/// let options = UploadOptions::new()
///     .auth_token(|| async { Ok(Some("id-token".to_string())) })
///     .custom_headers(|| async { Ok(vec![("X-Client".to_string(), "docs".to_string())]) })
///     .throw_on_cancel(true);
/// assert!(options.throws_on_cancel());
/// ```
#[derive(Clone)]
pub struct UploadOptions {
    auth_token_provider: Option<AuthTokenProvider>,
    custom_headers_provider: Option<HeadersProvider>,
    throw_on_cancel: bool,
    auth_scheme: String,
    progress_interval: Duration,
}

impl UploadOptions {
    /// Options with no credentials, no extra headers and silent cancellation
    pub fn new() -> Self {
        Self {
            auth_token_provider: None,
            custom_headers_provider: None,
            throw_on_cancel: false,
            auth_scheme: STORAGE_AUTH_SCHEME.to_string(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Set the auth-token provider, awaited once per request
    pub fn auth_token<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<String>>> + Send + 'static,
    {
        self.auth_token_provider = Some(Arc::new(move || provider().boxed()));
        self
    }

    /// Use a fixed auth token
    pub fn static_token(self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.auth_token(move || {
            let token = token.clone();
            async move { Ok(Some(token)) }
        })
    }

    /// Set the custom-header provider, awaited once per upload
    pub fn custom_headers<F, Fut>(mut self, provider: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<(String, String)>>> + Send + 'static,
    {
        self.custom_headers_provider = Some(Arc::new(move || provider().boxed()));
        self
    }

    /// Surface cancellation as [`Error::Cancelled`](crate::Error::Cancelled)
    /// instead of an empty result
    pub fn throw_on_cancel(mut self, throw_on_cancel: bool) -> Self {
        self.throw_on_cancel = throw_on_cancel;
        self
    }

    /// Override the authorization scheme name
    pub fn auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    /// Set the interval between progress samples
    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Whether cancellation is surfaced as an error
    pub fn throws_on_cancel(&self) -> bool {
        self.throw_on_cancel
    }

    /// Interval between progress samples
    pub fn interval(&self) -> Duration {
        self.progress_interval
    }

    /// Await the auth-token provider, if any
    pub(crate) async fn resolve_auth(&self) -> Result<Option<Auth>> {
        let Some(provider) = &self.auth_token_provider else {
            return Ok(None);
        };
        let token = provider().await?;
        Ok(token.map(|token| Auth::custom(self.auth_scheme.clone(), token)))
    }

    /// Await the custom-header provider, if any
    pub(crate) async fn resolve_headers(&self) -> Result<Vec<(String, String)>> {
        match &self.custom_headers_provider {
            Some(provider) => provider().await,
            None => Ok(Vec::new()),
        }
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("auth_token_provider", &self.auth_token_provider.is_some())
            .field("custom_headers_provider", &self.custom_headers_provider.is_some())
            .field("throw_on_cancel", &self.throw_on_cancel)
            .field("auth_scheme", &self.auth_scheme)
            .field("progress_interval", &self.progress_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_defaults() {
        let options = UploadOptions::default();
        assert!(!options.throws_on_cancel());
        assert_eq!(options.interval(), Duration::from_millis(500));
        let shown = format!("{options:?}");
        assert!(shown.contains("auth_token_provider: false"));
        assert!(shown.contains("Firebase"));
    }

    #[tokio::test]
    async fn test_resolve_without_providers() {
        let options = UploadOptions::new();
        assert!(options.resolve_auth().await.unwrap().is_none());
        assert!(options.resolve_headers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_token_uses_scheme() {
        let options = UploadOptions::new().static_token("abc");
        let auth = options.resolve_auth().await.unwrap().unwrap();
        assert_eq!(auth.to_header_value(), "Firebase abc");

        let options = options.auth_scheme("Token");
        let auth = options.resolve_auth().await.unwrap().unwrap();
        assert_eq!(auth.to_header_value(), "Token abc");
    }

    #[tokio::test]
    async fn test_absent_token() {
        let options = UploadOptions::new().auth_token(|| async { Ok(None) });
        assert!(options.resolve_auth().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provider_errors_propagate() {
        let options = UploadOptions::new()
            .auth_token(|| async { Err(Error::Provider("token expired".into())) });
        let result = options.resolve_auth().await;
        assert!(matches!(result, Err(Error::Provider(msg)) if msg == "token expired"));
    }

    #[tokio::test]
    async fn test_headers_keep_order() {
        let options = UploadOptions::new().custom_headers(|| async {
            Ok(vec![
                ("X-First".to_string(), "1".to_string()),
                ("X-Second".to_string(), "2".to_string()),
            ])
        });
        let headers = options.resolve_headers().await.unwrap();
        assert_eq!(headers[0].0, "X-First");
        assert_eq!(headers[1].0, "X-Second");
    }
}
