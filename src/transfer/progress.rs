//! Progress events for uploads
//!
//! Progress is reported through an explicit [`ProgressReporter`] handed to
//! the coordinator. Events go out over an unbounded channel; rendering them is
//! the receiver's business. A reporter whose receiver was dropped (or the
//! [`Default`] one) silently discards events.
//!
//! ```
//! use gcs_resource::transfer::{ProgressEvent, ProgressReporter};
//!
//! let (reporter, mut receiver) = ProgressReporter::new();
//! reporter.report(ProgressEvent::Composing { key: "app.tgz".into(), parts: 4 });
//!
//! assert!(matches!(receiver.try_recv(), Ok(ProgressEvent::Composing { parts: 4, .. })));
//! ```

use pin_project::{pin_project, pinned_drop};
use serde::{Deserialize, Serialize};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Progress event emitted while publishing a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProgressEvent {
    /// Upload of `key` started
    TransferStarted {
        key: String,
        total_bytes: u64,
        /// Number of chunks; 1 for a single-request upload
        parts: usize,
    },

    /// Bytes read from the local file and handed to the store
    BytesTransferred {
        part: usize,
        bytes: u64,
    },

    /// One chunk finished uploading
    PartCompleted {
        part: usize,
        bytes: u64,
    },

    /// One chunk failed
    PartFailed {
        part: usize,
        error: String,
    },

    /// Parts are being composed into the destination
    Composing {
        key: String,
        parts: usize,
    },

    /// The destination object is complete
    TransferCompleted {
        key: String,
        total_bytes: u64,
        duration: Duration,
    },
}

/// Sender half for [`ProgressEvent`]s
#[derive(Clone)]
pub struct ProgressReporter {
    sender: Arc<UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    /// Create a reporter and the receiver its events arrive on
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded_channel();
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    /// A reporter that discards every event
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn report(&self, event: ProgressEvent) {
        // Receiver may be gone
        let _ = self.sender.send(event);
    }

    pub fn is_enabled(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        let (sender, _) = unbounded_channel();
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Bytes a [`ProgressReader`] accumulates before reporting them
pub const REPORT_GRANULARITY: u64 = 1 << 20;

/// Reader adapter that counts the bytes pulled through it and reports them
/// as [`ProgressEvent::BytesTransferred`] for one part.
///
/// Reads are coalesced: an event goes out every [`REPORT_GRANULARITY`] bytes,
/// at end of input, and when the reader is dropped with bytes unreported.
#[pin_project(PinnedDrop)]
pub struct ProgressReader<R> {
    #[pin]
    inner: R,
    part: usize,
    counter: Arc<AtomicU64>,
    unreported: u64,
    reporter: ProgressReporter,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, part: usize, reporter: ProgressReporter) -> Self {
        Self {
            inner,
            part,
            counter: Arc::new(AtomicU64::new(0)),
            unreported: 0,
            reporter,
        }
    }

    /// Shared byte counter; stays readable after the reader is handed away
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.counter)
    }

    pub fn bytes_read(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

fn flush(reporter: &ProgressReporter, part: usize, unreported: &mut u64) {
    if *unreported > 0 {
        reporter.report(ProgressEvent::BytesTransferred {
            part,
            bytes: *unreported,
        });
        *unreported = 0;
    }
}

impl<R: AsyncRead> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);

        if let Poll::Ready(Ok(())) = &result {
            let read = (buf.filled().len() - before) as u64;
            if read > 0 {
                this.counter.fetch_add(read, Ordering::Relaxed);
                *this.unreported += read;
                if *this.unreported >= REPORT_GRANULARITY {
                    flush(this.reporter, *this.part, this.unreported);
                }
            } else if buf.remaining() > 0 {
                // End of input
                flush(this.reporter, *this.part, this.unreported);
            }
        }

        result
    }
}

#[pinned_drop]
impl<R> PinnedDrop for ProgressReader<R> {
    fn drop(self: Pin<&mut Self>) {
        let this = self.project();
        flush(this.reporter, *this.part, this.unreported);
    }
}
