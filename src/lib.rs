//! Upload tasks with live progress for object-storage HTTP APIs
//!
//! This crate uploads a byte stream to a storage service over a shared
//! [`Transport`], reports progress on a fixed cadence while the request is in
//! flight, and turns the server's JSON reply into a download URL.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stowage::{CancellationToken, Transport, UploadOptions, UploadStream};
//!
//! # #[tokio::main]
//! # async fn main() -> stowage::Result<()> {
//! let transport = Transport::new()?;
//! let cancel = CancellationToken::new();
//!
//! let file = tokio::fs::File::open("photo.png").await?;
//! let task = transport
//!     .upload("https://storage.example.com/v0/b/bucket/o?name=photo.png")
//!     .options(UploadOptions::new().auth_token(|| async { Ok(Some("id-token".to_string())) }))
//!     .download_url("https://storage.example.com/v0/b/bucket/o/photo.png?alt=media&token=")
//!     .stream(UploadStream::from_file(file).await?)
//!     .cancellation(cancel.clone())
//!     .progress(|p| println!("{}%", p.percentage()))
//!     .start()?;
//!
//! let url = task.await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

pub use auth::{Auth, STORAGE_AUTH_SCHEME};
pub use body::{StreamHandle, UploadStream};
pub use error::{Error, NO_RESPONSE, Result};
pub use options::{AuthTokenProvider, HeadersProvider, UploadOptions};
pub use progress::{
    DEFAULT_PROGRESS_INTERVAL, Progress, ProgressCallback, ProgressSnapshot, ReporterExit,
};
pub use request::Request;
pub use response::Response;
pub use transport::{DEFAULT_TIMEOUT, Transport, TransportConfig};
pub use upload::{UploadBuilder, UploadTask};

pub use http::Method;
pub use tokio_util::sync::CancellationToken;

mod auth;
mod body;
mod error;
mod options;
mod progress;
mod request;
mod response;
mod transport;
mod upload;
