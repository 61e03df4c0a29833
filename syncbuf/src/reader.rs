//! Streaming readers
//!
//! Each `Reader` owns one background loop that walks its private cursor
//! towards the buffer's visible end and hands items to the reader's stream,
//! one at a time, through a zero-capacity handoff. A slow consumer therefore
//! holds back only its own reader.
//!
//! Every iteration of the loop:
//!
//! 1. reader closed: stop, nothing more is delivered;
//! 2. buffer closed: deliver everything from the cursor to the newest item as
//!    one final chunk (if there is anything), then stop;
//! 3. read the retained items between the cursor and the visible end; a
//!    cursor older than the oldest retained item jumps forward to it once
//!    that item is visible;
//! 4. nothing to read: sleep for the poll interval and retry;
//! 5. otherwise hand the items over in order, advancing the cursor after
//!    each one the consumer took.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::FusedStream;
use futures::Stream;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::frontier::Frontier;
use crate::handoff::{self, HandoffReceiver, HandoffSender};
use crate::idgen::ReaderId;
use crate::shutdown::{Shutdown, ShutdownListener};
use crate::storage::{Position, Storage};

/// Shared data passed from a buffer to each of its readers
#[derive(Clone)]
pub(crate) struct ReaderSharedData {
    pub(crate) storage: Arc<dyn Storage>,
    /// `None` for a self-throttling buffer: everything added is visible
    pub(crate) frontier: Option<Arc<Frontier>>,
    pub(crate) buffer_closed: ShutdownListener,
    pub(crate) poll_interval: Duration,
}

impl ReaderSharedData {
    fn visible_end(&self) -> Position {
        match &self.frontier {
            Some(frontier) => frontier.position(),
            None => self.storage.total_inserted(),
        }
    }
}

/// Independent consumer of a buffer
///
/// Created by `SyncBuffer::new_reader`. Take its items with `stream()`;
/// stop it with `close()`. Dropping a reader stops its loop as well, without
/// waiting for it.
pub struct Reader {
    id: ReaderId,
    own_closed: Shutdown,
    stream: Option<ReaderStream>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Reader {
    pub(crate) fn spawn(id: ReaderId, start: Position, shared: ReaderSharedData) -> Self {
        let own_closed = Shutdown::new();
        let (output, items) = handoff::channel();

        let catch_up = CatchUpLoop {
            id,
            cursor: start,
            shared,
            own_closed: own_closed.listener(),
            output,
        };
        let task = tokio::spawn(catch_up.run());

        let stream = ReaderStream {
            id,
            items: Some(items),
            own_closed: own_closed.listener(),
        };

        Self {
            id,
            own_closed,
            stream: Some(stream),
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    #[must_use]
    pub fn id(&self) -> ReaderId {
        self.id
    }

    /// The reader's items
    ///
    /// The stream is finite and cannot be restarted: it ends when the reader
    /// is closed, or after the final flushed chunk once the buffer is closed.
    /// Only the first call returns the live stream.
    ///
    /// The stream does not keep its reader alive. Dropping the `Reader`
    /// closes it, so `buffer.new_reader().stream()` yields nothing: bind the
    /// reader to a variable for as long as the stream is read.
    pub fn stream(&mut self) -> ReaderStream {
        self.stream.take().unwrap_or_else(|| {
            log::warn!("Reader::stream() called again on reader {}", self.id);
            ReaderStream {
                id: self.id,
                items: None,
                own_closed: self.own_closed.listener(),
            }
        })
    }

    /// Stop the reader and wait until its loop has exited
    ///
    /// Nothing is flushed. Idempotent and safe to call concurrently: every
    /// caller returns only after the loop is gone.
    pub async fn close(&self) {
        if self.own_closed.trigger() {
            debug!(reader = %self.id, "reader closing");
        }
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                warn!(reader = %self.id, "reader loop failed: {e}");
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.own_closed.is_triggered()
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reader(id={}, closed={}, stream_taken={})",
            self.id,
            self.is_closed(),
            self.stream.is_none()
        )
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.own_closed.trigger();
    }
}

/// Stream of byte chunks produced by a `Reader`
///
/// Ends for good once it has returned `None`.
pub struct ReaderStream {
    id: ReaderId,
    items: Option<HandoffReceiver<Bytes>>,
    own_closed: ShutdownListener,
}

impl ReaderStream {
    #[must_use]
    pub fn reader_id(&self) -> ReaderId {
        self.id
    }
}

impl Stream for ReaderStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        let this = self.get_mut();
        // A closed reader ends at once, whatever is in flight
        if this.own_closed.is_triggered() {
            this.items = None;
        }
        let Some(items) = this.items.as_mut() else {
            return Poll::Ready(None);
        };

        let item = ready!(items.poll_recv(cx));
        if item.is_none() {
            this.items = None;
        }
        Poll::Ready(item)
    }
}

impl FusedStream for ReaderStream {
    fn is_terminated(&self) -> bool {
        self.items.is_none()
    }
}

impl fmt::Debug for ReaderStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ReaderStream(reader={}, ended={})",
            self.id,
            self.items.is_none()
        )
    }
}

// ============================================================================
// Background loop
// ============================================================================

/// Why a reader loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    ReaderClosed,
    /// Buffer closed, final chunk delivered
    Flushed,
    /// Buffer closed, the reader had already seen everything
    Drained,
    /// The stream was dropped
    ConsumerGone,
}

/// Outcome of handing one item over
enum Handed {
    Taken,
    BufferClosed,
    Stop(Exit),
}

struct CatchUpLoop {
    id: ReaderId,
    cursor: Position,
    shared: ReaderSharedData,
    own_closed: ShutdownListener,
    output: HandoffSender<Bytes>,
}

impl CatchUpLoop {
    async fn run(mut self) {
        let exit = self.catch_up().await;
        debug!(reader = %self.id, cursor = self.cursor, ?exit, "reader loop exited");
    }

    async fn catch_up(&mut self) -> Exit {
        loop {
            if self.own_closed.is_triggered() {
                return Exit::ReaderClosed;
            }
            if self.shared.buffer_closed.is_triggered() {
                return self.flush().await;
            }

            let items = self.read_visible();
            if items.is_empty() {
                self.back_off().await;
                continue;
            }

            for item in items {
                match self.hand_over(item).await {
                    Handed::Taken => {
                        trace!(reader = %self.id, position = self.cursor, "item delivered");
                        self.cursor += 1;
                    }
                    // Flushed from the cursor on the next turn
                    Handed::BufferClosed => break,
                    Handed::Stop(exit) => return exit,
                }
            }
        }
    }

    /// Retained items between the cursor and the visible end
    ///
    /// A cursor older than the oldest retained item jumps to the first
    /// returned one. Nothing returned: the cursor stays put, so it never
    /// passes the visible end.
    fn read_visible(&mut self) -> Vec<Bytes> {
        let range = self
            .shared
            .storage
            .read_range_to(self.cursor, self.shared.visible_end());
        if range.is_empty() {
            return range.items;
        }

        if range.start > self.cursor {
            debug!(
                reader = %self.id,
                from = self.cursor,
                to = range.start,
                "cursor behind oldest retained item, jumping forward"
            );
            self.cursor = range.start;
        }
        range.items
    }

    async fn hand_over(&mut self, item: Bytes) -> Handed {
        tokio::select! {
            biased;
            () = self.own_closed.triggered() => Handed::Stop(Exit::ReaderClosed),
            () = self.shared.buffer_closed.triggered() => Handed::BufferClosed,
            sent = self.output.send(item) => match sent {
                Ok(()) => Handed::Taken,
                Err(_) => Handed::Stop(Exit::ConsumerGone),
            },
        }
    }

    async fn back_off(&mut self) {
        // Whichever comes first; the loop re-checks both signals at the top
        tokio::select! {
            biased;
            () = self.own_closed.triggered() => {}
            () = self.shared.buffer_closed.triggered() => {}
            () = tokio::time::sleep(self.shared.poll_interval) => {}
        }
    }

    async fn flush(&mut self) -> Exit {
        let rest = self.shared.storage.rest(self.cursor);
        if rest.is_empty() {
            return Exit::Drained;
        }

        let len = rest.len();
        tokio::select! {
            biased;
            () = self.own_closed.triggered() => Exit::ReaderClosed,
            sent = self.output.send(rest) => match sent {
                Ok(()) => {
                    debug!(reader = %self.id, from = self.cursor, bytes = len, "final chunk flushed");
                    Exit::Flushed
                }
                Err(_) => Exit::ConsumerGone,
            },
        }
    }
}
