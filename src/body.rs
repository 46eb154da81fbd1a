//! Upload body streams and their shared position state

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use futures_util::{Stream, stream};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::progress::ProgressSnapshot;

/// Size of the chunks handed to the transport
const CHUNK_SIZE: usize = 64 * 1024;

/// A byte stream to upload.
///
/// Wraps any [`AsyncRead`] together with its declared total length and the
/// position it currently sits at. The upload reads it sequentially from that
/// position; it is never rewound. A [`StreamHandle`] obtained from
/// [`UploadStream::handle`] observes the read position while the upload runs.
///
/// # Examples
///
/// ```rust
/// use stowage::UploadStream;
///
/// let stream = UploadStream::from_bytes(&b"0123456789"[..]);
/// assert_eq!(stream.handle().length(), 10);
/// assert_eq!(stream.remaining(), 10);
/// ```
pub struct UploadStream {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    handle: StreamHandle,
}

impl UploadStream {
    /// Create a stream from a reader positioned at its start.
    pub fn new<R>(reader: R, length: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::with_position(reader, 0, length)
    }

    /// Create a stream from a reader that has already been advanced to
    /// `position` of a `length`-byte source.
    ///
    /// Progress is reported as absolute positions, so the first snapshot
    /// starts at `position` rather than zero.
    pub fn with_position<R>(reader: R, position: u64, length: u64) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            handle: StreamHandle::new(position.min(length), length),
        }
    }

    /// Create a stream over in-memory data.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let length = data.len() as u64;
        Self::new(std::io::Cursor::new(data), length)
    }

    /// Create a stream from an open file, starting at its current seek
    /// position.
    pub async fn from_file(mut file: tokio::fs::File) -> std::io::Result<Self> {
        let length = file.metadata().await?.len();
        let position = file.stream_position().await?;
        Ok(Self::with_position(file, position, length))
    }

    /// Handle for observing this stream's position
    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Bytes left between the current position and the declared length
    pub fn remaining(&self) -> u64 {
        self.handle.length() - self.handle.position()
    }

    /// Turn the stream into a request body.
    pub(crate) fn into_body(self) -> reqwest::Body {
        reqwest::Body::wrap_stream(self.into_chunks())
    }

    /// Read the stream as a sequence of chunks; every chunk yielded advances
    /// the shared position.
    fn into_chunks(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        stream::try_unfold((self.reader, self.handle), |(mut reader, handle)| async move {
            let mut buf = vec![0u8; CHUNK_SIZE];
            let read = reader.read(&mut buf).await?;
            if read == 0 {
                return Ok::<_, std::io::Error>(None);
            }
            buf.truncate(read);
            handle.advance(read as u64);
            Ok(Some((Bytes::from(buf), (reader, handle))))
        })
    }
}

impl fmt::Debug for UploadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadStream")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

struct StreamState {
    position: AtomicU64,
    length: u64,
    released: AtomicBool,
}

/// Shared, read-only view of an [`UploadStream`]'s position.
///
/// The upload advances the position as it reads; any number of handles may
/// sample it concurrently without locking. Calling [`StreamHandle::release`]
/// marks the stream as disposed by its owner: samples taken afterwards return
/// `None`.
#[derive(Clone)]
pub struct StreamHandle {
    state: Arc<StreamState>,
}

impl StreamHandle {
    fn new(position: u64, length: u64) -> Self {
        Self {
            state: Arc::new(StreamState {
                position: AtomicU64::new(position),
                length,
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Current read position
    pub fn position(&self) -> u64 {
        self.state.position.load(Ordering::Acquire)
    }

    /// Declared total length
    pub fn length(&self) -> u64 {
        self.state.length
    }

    /// Mark the stream as released by its owner.
    ///
    /// The upload itself is not interrupted; only sampling stops.
    pub fn release(&self) {
        self.state.released.store(true, Ordering::Release);
    }

    /// Whether [`release`](Self::release) has been called
    pub fn is_released(&self) -> bool {
        self.state.released.load(Ordering::Acquire)
    }

    /// Sample position and length, or `None` once the stream is released.
    pub fn sample(&self) -> Option<ProgressSnapshot> {
        if self.is_released() {
            return None;
        }
        Some(ProgressSnapshot::new(self.position(), self.length()))
    }

    fn advance(&self, bytes: u64) {
        let length = self.state.length;
        // Saturate at the declared length; readers may yield more than declared.
        let _ = self
            .state
            .position
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(bytes).min(length))
            });
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("position", &self.position())
            .field("length", &self.length())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    async fn read_all(stream: UploadStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.into_chunks().try_collect().await.unwrap();
        chunks.concat()
    }

    #[test]
    fn test_from_bytes_length() {
        let stream = UploadStream::from_bytes(vec![1u8; 10]);
        let handle = stream.handle();
        assert_eq!(handle.position(), 0);
        assert_eq!(handle.length(), 10);
        assert_eq!(stream.remaining(), 10);
    }

    #[test]
    fn test_with_position_clamps_to_length() {
        let stream = UploadStream::with_position(std::io::Cursor::new(vec![0u8; 4]), 20, 10);
        assert_eq!(stream.handle().position(), 10);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn test_advance_saturates() {
        let handle = StreamHandle::new(0, 8);
        handle.advance(5);
        assert_eq!(handle.position(), 5);
        handle.advance(5);
        assert_eq!(handle.position(), 8);
    }

    #[test]
    fn test_sample_after_release() {
        let handle = StreamHandle::new(3, 10);
        let snapshot = handle.sample().unwrap();
        assert_eq!(snapshot.bytes_transferred, 3);
        assert_eq!(snapshot.total_bytes, 10);

        let other = handle.clone();
        other.release();
        assert!(handle.is_released());
        assert!(handle.sample().is_none());
    }

    #[tokio::test]
    async fn test_reading_advances_shared_position() {
        let stream = UploadStream::from_bytes(&b"hello world"[..]);
        let observer = stream.handle();
        assert_eq!(read_all(stream).await, b"hello world");
        assert_eq!(observer.position(), 11);
    }

    #[tokio::test]
    async fn test_large_input_is_chunked() {
        let data = vec![7u8; CHUNK_SIZE * 2 + 10];
        let stream = UploadStream::from_bytes(data.clone());
        let observer = stream.handle();
        let chunks: Vec<Bytes> = stream.into_chunks().try_collect().await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), data);
        assert_eq!(observer.position(), data.len() as u64);
    }

    #[tokio::test]
    async fn test_from_file_uses_current_offset() {
        let mut file = tempfile::tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"0123456789").unwrap();
        std::io::Seek::seek(&mut file, std::io::SeekFrom::Start(4)).unwrap();

        let stream = UploadStream::from_file(tokio::fs::File::from_std(file))
            .await
            .unwrap();
        let observer = stream.handle();
        assert_eq!(observer.position(), 4);
        assert_eq!(observer.length(), 10);
        assert_eq!(stream.remaining(), 6);

        assert_eq!(read_all(stream).await, b"456789");
        assert_eq!(observer.position(), 10);
    }
}
