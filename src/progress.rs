//! Progress snapshots, subscriptions and the reporter loop

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};

use crate::body::StreamHandle;

/// Default interval between two progress samples
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Progress of an upload at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Number of bytes read from the stream so far
    pub bytes_transferred: u64,
    /// Total length of the stream
    pub total_bytes: u64,
}

impl ProgressSnapshot {
    /// Create a snapshot
    pub fn new(bytes_transferred: u64, total_bytes: u64) -> Self {
        Self {
            bytes_transferred,
            total_bytes,
        }
    }

    /// Whole percentage transferred, 0 for an empty stream
    pub fn percentage(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let percent = u128::from(self.bytes_transferred) * 100 / u128::from(self.total_bytes);
        percent.min(100) as u8
    }
}

/// Progress callback function type
pub type ProgressCallback = dyn Fn(ProgressSnapshot) + Send + Sync;

#[derive(Clone)]
enum Subscriber {
    Callback(Arc<ProgressCallback>),
    Channel(mpsc::UnboundedSender<ProgressSnapshot>),
    Latest(watch::Sender<Option<ProgressSnapshot>>),
}

/// Subscription point for progress notifications.
///
/// Cloning yields another handle to the same subscriber list. Delivery is
/// synchronous and best-effort: closed channels are skipped and a panicking
/// callback only aborts its own delivery.
///
/// # Examples
///
/// ```rust
/// use stowage::{Progress, ProgressSnapshot};
///
/// let progress = Progress::new();
/// progress.subscribe(|snapshot: ProgressSnapshot| {
///     println!("{}%", snapshot.percentage());
/// });
/// let mut rx = progress.channel();
/// # drop(rx.try_recv());
/// ```
#[derive(Clone)]
pub struct Progress {
    subscribers: Arc<ArcSwap<Vec<Subscriber>>>,
}

impl Progress {
    /// Create an empty subscriber list
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }
    }

    /// Register a callback invoked with every snapshot
    pub fn subscribe<F>(&self, callback: F)
    where
        F: Fn(ProgressSnapshot) + Send + Sync + 'static,
    {
        self.add(Subscriber::Callback(Arc::new(callback)));
    }

    /// Register a channel receiving every snapshot.
    ///
    /// The channel is unbounded: a receiver that is kept but not drained
    /// buffers one snapshot per interval until the upload settles. Use
    /// [`Progress::watch`] when only the most recent value matters.
    pub fn channel(&self) -> mpsc::UnboundedReceiver<ProgressSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add(Subscriber::Channel(tx));
        rx
    }

    /// Register a receiver holding only the latest snapshot, `None` until the
    /// first one is reported
    pub fn watch(&self) -> watch::Receiver<Option<ProgressSnapshot>> {
        let (tx, rx) = watch::channel(None);
        self.add(Subscriber::Latest(tx));
        rx
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load().len()
    }

    fn add(&self, subscriber: Subscriber) {
        self.subscribers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(subscriber.clone());
            next
        });
    }

    /// Deliver a snapshot to every subscriber
    pub(crate) fn report(&self, snapshot: ProgressSnapshot) {
        let subscribers = self.subscribers.load();
        for subscriber in subscribers.iter() {
            match subscriber {
                Subscriber::Callback(callback) => {
                    if catch_unwind(AssertUnwindSafe(|| callback(snapshot))).is_err() {
                        tracing::trace!("progress callback panicked; snapshot dropped");
                    }
                }
                Subscriber::Channel(tx) => {
                    // Receiver gone; nothing to deliver to.
                    let _ = tx.send(snapshot);
                }
                Subscriber::Latest(tx) => {
                    tx.send_replace(Some(snapshot));
                }
            }
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Why a progress reporter stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterExit {
    /// The upload settled (succeeded, failed or was cancelled)
    Settled,
    /// The stream was released by its owner before the upload settled
    StreamReleased,
}

/// Samples a stream at a fixed cadence until the upload settles.
pub(crate) struct ProgressReporter {
    stream: StreamHandle,
    progress: Progress,
    interval: Duration,
    settled: oneshot::Receiver<()>,
}

impl ProgressReporter {
    pub(crate) fn new(
        stream: StreamHandle,
        progress: Progress,
        interval: Duration,
        settled: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            stream,
            progress,
            interval,
            settled,
        }
    }

    /// Run until settlement or stream release.
    ///
    /// A dropped settlement sender counts as settlement.
    pub(crate) async fn run(mut self) -> ReporterExit {
        loop {
            tokio::select! {
                biased;
                _ = &mut self.settled => {
                    tracing::debug!("upload settled; progress reporter stopping");
                    return ReporterExit::Settled;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            match self.stream.sample() {
                Some(snapshot) => self.progress.report(snapshot),
                None => {
                    tracing::debug!("stream released; progress reporter stopping");
                    return ReporterExit::StreamReleased;
                }
            }
        }
    }
}
