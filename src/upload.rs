//! Upload tasks: one authenticated upload with concurrent progress reporting

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::Method;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::body::{StreamHandle, UploadStream};
use crate::error::NO_RESPONSE;
use crate::options::UploadOptions;
use crate::progress::{Progress, ProgressReporter, ProgressSnapshot, ReporterExit};
use crate::request::Request;
use crate::transport::Transport;
use crate::{Error, Result};

/// Response field holding the server-issued download token
const DOWNLOAD_TOKENS_FIELD: &str = "downloadTokens";

/// A running upload.
///
/// Creating a task spawns the upload and its progress reporter on the tokio
/// runtime straight away; awaiting the task yields the download URL.
/// Awaiting resolves to:
///
/// - `Ok(prefix + token)` on success;
/// - `Ok("")` when cancelled and [`UploadOptions::throw_on_cancel`] is off;
/// - `Err(Error::Cancelled)` when cancelled and it is on;
/// - `Err(Error::UploadFailed { .. })` for every other failure.
///
/// # Examples
///
/// ```rust,no_run
/// use stowage::{Transport, UploadOptions, UploadStream};
///
/// # #[tokio::main]
/// # async fn main() -> stowage::Result<()> {
/// let transport = Transport::new()?;
/// let task = transport
///     .upload("https://storage.example.com/v0/b/bucket/o?name=photo.png")
///     .options(UploadOptions::new().static_token("id-token"))
///     .download_url("https://storage.example.com/v0/b/bucket/o/photo.png?alt=media&token=")
///     .content_type("image/png")
///     .stream(UploadStream::from_bytes(vec![0u8; 1024]))
///     .progress(|p| println!("{} / {} bytes", p.bytes_transferred, p.total_bytes))
///     .start()?;
///
/// let url = task.await?;
/// println!("Uploaded to {url}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct UploadTask {
    target_url: String,
    upload: JoinHandle<Result<String>>,
    reporter: Option<JoinHandle<ReporterExit>>,
    progress: Progress,
    stream: StreamHandle,
}

impl UploadTask {
    /// Start an upload.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        transport: &Transport,
        options: UploadOptions,
        url: impl Into<String>,
        download_url: impl Into<String>,
        stream: UploadStream,
        cancel: CancellationToken,
        content_type: Option<String>,
    ) -> Self {
        Self::start(
            transport,
            options,
            url.into(),
            download_url.into(),
            stream,
            cancel,
            content_type,
            Progress::new(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn start(
        transport: &Transport,
        options: UploadOptions,
        url: String,
        download_url: String,
        stream: UploadStream,
        cancel: CancellationToken,
        content_type: Option<String>,
        progress: Progress,
    ) -> Self {
        let stream_handle = stream.handle();
        let (settled_tx, settled_rx) = oneshot::channel();

        let reporter = ProgressReporter::new(
            stream_handle.clone(),
            progress.clone(),
            options.interval(),
            settled_rx,
        );

        let upload = tokio::spawn(upload_file(
            transport.clone(),
            options,
            url.clone(),
            download_url,
            stream,
            cancel,
            content_type,
            settled_tx,
        ));
        let reporter = tokio::spawn(reporter.run());

        Self {
            target_url: url,
            upload,
            reporter: Some(reporter),
            progress,
            stream: stream_handle,
        }
    }

    /// URL the data is uploaded to
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// Progress subscriptions for this upload
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Handle on the uploaded stream; release it once the task has settled
    pub fn stream_handle(&self) -> &StreamHandle {
        &self.stream
    }

    /// Whether the upload has settled
    pub fn is_settled(&self) -> bool {
        self.upload.is_finished()
    }

    /// Take the progress reporter's join handle to learn why it stopped.
    ///
    /// Returns `None` on every call after the first.
    pub fn take_reporter(&mut self) -> Option<JoinHandle<ReporterExit>> {
        self.reporter.take()
    }
}

impl Future for UploadTask {
    type Output = Result<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.upload).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) if e.is_cancelled() => Poll::Ready(Err(Error::Cancelled)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(Error::Internal(format!(
                "Upload task panicked: {}",
                e
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Builder for starting an [`UploadTask`].
///
/// Created with [`Transport::upload`].
pub struct UploadBuilder {
    transport: Transport,
    url: String,
    options: UploadOptions,
    download_url: String,
    stream: Option<UploadStream>,
    cancel: CancellationToken,
    content_type: Option<String>,
    progress: Progress,
}

impl UploadBuilder {
    pub(crate) fn new(transport: Transport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
            options: UploadOptions::new(),
            download_url: String::new(),
            stream: None,
            cancel: CancellationToken::new(),
            content_type: None,
            progress: Progress::new(),
        }
    }

    /// Set the upload options
    pub fn options(mut self, options: UploadOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the prefix the download token is appended to
    pub fn download_url(mut self, download_url: impl Into<String>) -> Self {
        self.download_url = download_url.into();
        self
    }

    /// Set the stream to upload
    pub fn stream(mut self, stream: UploadStream) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Set the cancellation token observed while the request is in flight
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set the `Content-Type` of the body
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Register a progress callback before the upload starts
    pub fn progress<F>(self, callback: F) -> Self
    where
        F: Fn(ProgressSnapshot) + Send + Sync + 'static,
    {
        self.progress.subscribe(callback);
        self
    }

    /// Spawn the upload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if no stream was set.
    pub fn start(self) -> Result<UploadTask> {
        let stream = self
            .stream
            .ok_or_else(|| Error::Internal("No stream specified for upload".to_string()))?;

        Ok(UploadTask::start(
            &self.transport,
            self.options,
            self.url,
            self.download_url,
            stream,
            self.cancel,
            self.content_type,
            self.progress,
        ))
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_file(
    transport: Transport,
    options: UploadOptions,
    url: String,
    download_url: String,
    stream: UploadStream,
    cancel: CancellationToken,
    content_type: Option<String>,
    settled: oneshot::Sender<()>,
) -> Result<String> {
    tracing::debug!(url = %url, bytes = stream.remaining(), "starting upload");

    let mut response_data = None;
    let outcome = send_upload(
        &transport,
        &options,
        &url,
        &download_url,
        stream,
        &cancel,
        content_type.as_deref(),
        &mut response_data,
    )
    .await;

    let result = match outcome {
        Ok(download) => {
            tracing::info!(url = %url, "upload complete");
            Ok(download)
        }
        Err(Error::Cancelled) => {
            tracing::debug!(url = %url, "upload cancelled");
            if options.throws_on_cancel() {
                Err(Error::Cancelled)
            } else {
                Ok(String::new())
            }
        }
        Err(source) => {
            tracing::warn!(url = %url, error = %source, "upload failed");
            let response_data = response_data.unwrap_or_else(|| NO_RESPONSE.to_string());
            Err(Error::upload_failed(url, response_data, source))
        }
    };

    // Reporter may already be gone.
    let _ = settled.send(());
    result
}

/// Send the upload and turn the response into a download URL.
///
/// `response_data` receives the response text as soon as it has been read,
/// before the status is checked.
#[allow(clippy::too_many_arguments)]
async fn send_upload(
    transport: &Transport,
    options: &UploadOptions,
    url: &str,
    download_url: &str,
    stream: UploadStream,
    cancel: &CancellationToken,
    content_type: Option<&str>,
    response_data: &mut Option<String>,
) -> Result<String> {
    let mut request = Request::new(Method::POST, url)?;
    request.set_body(stream);

    if let Some(auth) = options.resolve_auth().await? {
        request.set_auth(&auth)?;
    }

    if let Some(content_type) = content_type.filter(|c| !c.is_empty()) {
        request.set_content_type(content_type)?;
    }

    for (name, value) in options.resolve_headers().await? {
        request.append_header(&name, &value)?;
    }

    let (status, text) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        exchange = async {
            let response = transport.execute(request).await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, Error>((status, text))
        } => exchange?,
    };
    *response_data = Some(text);
    let text = response_data.as_deref().unwrap_or_default();

    if !status.is_success() {
        return Err(Error::Status {
            status: status.as_u16(),
        });
    }

    let token = parse_download_token(text)?;
    Ok(format!("{}{}", download_url, token))
}

/// Extract the download token from a flat JSON object
fn parse_download_token(text: &str) -> Result<String> {
    let document: HashMap<String, serde_json::Value> = serde_json::from_str(text)?;
    match document.get(DOWNLOAD_TOKENS_FIELD) {
        Some(serde_json::Value::String(token)) => Ok(token.clone()),
        Some(serde_json::Value::Null) | None => Err(Error::MissingDownloadToken),
        Some(other) => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download_token() {
        let token = parse_download_token(r#"{"name":"a.png","downloadTokens":"abc123"}"#).unwrap();
        assert_eq!(token, "abc123");
    }

    #[test]
    fn test_parse_download_token_keeps_token_list_verbatim() {
        let token = parse_download_token(r#"{"downloadTokens":"t1,t2"}"#).unwrap();
        assert_eq!(token, "t1,t2");
    }

    #[test]
    fn test_parse_download_token_non_string_scalar() {
        let token = parse_download_token(r#"{"downloadTokens":42}"#).unwrap();
        assert_eq!(token, "42");
    }

    #[test]
    fn test_parse_download_token_missing() {
        assert!(matches!(
            parse_download_token(r#"{"name":"a.png"}"#),
            Err(Error::MissingDownloadToken)
        ));
        assert!(matches!(
            parse_download_token(r#"{"downloadTokens":null}"#),
            Err(Error::MissingDownloadToken)
        ));
    }

    #[test]
    fn test_parse_download_token_rejects_other_shapes() {
        assert!(matches!(parse_download_token(r#"["abc"]"#), Err(Error::Json(_))));
        assert!(matches!(parse_download_token("<html>"), Err(Error::Json(_))));
        assert!(matches!(parse_download_token(""), Err(Error::Json(_))));
    }

    #[tokio::test]
    async fn test_builder_requires_stream() {
        let transport = Transport::new().unwrap();
        let result = transport.upload("https://x/upload").start();
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_fails_without_response() {
        let transport = Transport::new().unwrap();
        let task = UploadTask::new(
            &transport,
            UploadOptions::new(),
            "not a url",
            "https://x/dl?token=",
            UploadStream::from_bytes(&b"data"[..]),
            CancellationToken::new(),
            None,
        );
        assert_eq!(task.target_url(), "not a url");

        let error = task.await.unwrap_err();
        assert_eq!(error.url(), Some("not a url"));
        assert_eq!(error.response_data(), Some(NO_RESPONSE));
        assert!(matches!(
            error,
            Error::UploadFailed { source, .. } if matches!(*source, Error::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_provider_cancellation_is_classified_as_cancel() {
        let transport = Transport::new().unwrap();
        let options = UploadOptions::new().auth_token(|| async { Err(Error::Cancelled) });
        let task = UploadTask::new(
            &transport,
            options,
            "https://x/upload",
            "",
            UploadStream::from_bytes(&b"data"[..]),
            CancellationToken::new(),
            None,
        );
        assert_eq!(task.await.unwrap(), "");
    }
}
