//! Sync buffer: one writer, many readers kept roughly in sync
//!
//! The buffer owns a storage and one of two pacing mechanisms:
//!
//! - **Throttle**: `add` waits for a fixed interval after appending, so the
//!   producer itself is slowed down. Everything added is visible at once.
//! - **Clock**: `add` returns immediately; a background task consumes the
//!   clock's beat and moves the frontier one position per tick. Readers only
//!   see items below the frontier.
//!
//! Closing the buffer stops the clock, waits for the advance task and then
//! signals every reader, which flushes its unread items as one final chunk.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::clock::{Beat, Clock};
use crate::config::{JoinPolicy, Options, Pacing};
use crate::cursor::SeekCursor;
use crate::error::{Result, SyncBufferError};
use crate::frontier::Frontier;
use crate::idgen::IdGen;
use crate::reader::{Reader, ReaderSharedData};
use crate::shutdown::Shutdown;
use crate::storage::{Position, Storage, StoragePolicy};

/// Single-writer, multi-reader byte-item buffer
///
/// # Thread Safety
///
/// `SyncBuffer` is `Send + Sync`; share it through an `Arc`. It is meant for
/// one writer: concurrent `add` calls are serialized by the storage lock but
/// their relative order is whatever the lock decides.
///
/// Construction with a clock spawns a task, so it must happen within a tokio
/// runtime.
pub struct SyncBuffer {
    storage: Arc<dyn Storage>,
    frontier: Option<Arc<Frontier>>,
    clock: Option<Arc<dyn Clock>>,
    throttle: Option<Duration>,
    join: JoinPolicy,
    poll_interval: Duration,
    closed: Shutdown,
    advance_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    id_gen: IdGen,
}

impl SyncBuffer {
    #[must_use]
    pub fn new(storage: StoragePolicy, pacing: Pacing) -> Self {
        Self::with_options(storage, pacing, Options::default())
    }

    #[must_use]
    pub fn with_options(storage: StoragePolicy, pacing: Pacing, options: Options) -> Self {
        Self::with_storage(storage.build(), pacing, options)
    }

    /// Build a buffer around an existing storage
    #[must_use]
    pub fn with_storage(storage: Arc<dyn Storage>, pacing: Pacing, options: Options) -> Self {
        let poll_interval = options.resolve_poll_interval(&pacing);

        let (throttle, clock, frontier, advance_task) = match pacing {
            Pacing::Throttle(interval) => (Some(interval), None, None, None),
            Pacing::Clock(clock) => {
                let frontier = Arc::new(Frontier::new());
                let task = tokio::spawn(advance_frontier(
                    clock.beat(),
                    Arc::clone(&frontier),
                    Arc::clone(&storage),
                ));
                (None, Some(clock), Some(frontier), Some(task))
            }
        };
        debug!(
            throttle = ?throttle,
            clock_interval = ?clock.as_ref().and_then(|clock| clock.interval()),
            join = ?options.join,
            ?poll_interval,
            "sync buffer created"
        );

        Self {
            storage,
            frontier,
            clock,
            throttle,
            join: options.join,
            poll_interval,
            closed: Shutdown::new(),
            advance_task: tokio::sync::Mutex::new(advance_task),
            id_gen: IdGen::new(),
        }
    }

    /// Append an item, returning its position
    ///
    /// With throttle pacing this waits for the throttle interval before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the buffer has been closed; nothing is added then.
    pub async fn add(&self, item: impl Into<Bytes>) -> Result<Position> {
        if self.closed.is_triggered() {
            return Err(SyncBufferError::Closed);
        }

        let position = self.storage.add(item.into());
        trace!(position, "item added");

        if let Some(interval) = self.throttle {
            tokio::time::sleep(interval).await;
        }
        Ok(position)
    }

    /// Create a reader starting where the buffer's join policy says
    ///
    /// Must be called within a tokio runtime: the reader's loop is spawned
    /// here. A reader created after `close` flushes whatever it has not seen
    /// and ends.
    #[must_use]
    pub fn new_reader(&self) -> Reader {
        let start = match self.join {
            JoinPolicy::Tail => self.visible_end(),
            JoinPolicy::Replay => 0,
            JoinPolicy::RetainedHistory => self.storage.oldest_available(),
        };
        let id = self.id_gen.next_reader();
        debug!(reader = %id, start, join = ?self.join, "reader joined");

        Reader::spawn(id, start, self.share_with_reader())
    }

    /// Stop the clock, wait for the advance task, and terminate the buffer
    ///
    /// Every live reader then flushes its unread items and ends. Idempotent;
    /// concurrent callers all return only after the teardown is complete.
    pub async fn close(&self) {
        let mut advance_task = self.advance_task.lock().await;

        if let Some(clock) = &self.clock {
            clock.stop().await;
        }
        if let Some(handle) = advance_task.take() {
            if let Err(e) = handle.await {
                warn!("frontier advance task failed: {e}");
            }
        }

        if self.closed.trigger() {
            info!(
                total = self.storage.total_inserted(),
                frontier = ?self.frontier(),
                "sync buffer closed"
            );
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }

    /// Frontier of a clock-driven buffer, `None` with throttle pacing
    #[must_use]
    pub fn frontier(&self) -> Option<Position> {
        self.frontier.as_ref().map(|frontier| frontier.position())
    }

    /// Items below this position are visible to readers
    #[must_use]
    pub fn visible_end(&self) -> Position {
        self.frontier()
            .unwrap_or_else(|| self.storage.total_inserted())
    }

    #[must_use]
    pub fn total_inserted(&self) -> Position {
        self.storage.total_inserted()
    }

    #[must_use]
    pub fn oldest_available(&self) -> Position {
        self.storage.oldest_available()
    }

    #[must_use]
    pub fn join_policy(&self) -> JoinPolicy {
        self.join
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Seekable cursor over the buffer's storage, at the oldest retained item
    #[must_use]
    pub fn cursor(&self) -> SeekCursor {
        SeekCursor::new(Arc::clone(&self.storage))
    }

    /// Release items strictly before `up_to`
    ///
    /// Readers whose cursor is behind `up_to` jump forward on their next read.
    ///
    /// # Errors
    ///
    /// Returns `CompactionUnsupported` unless the storage is a log.
    pub fn compact(&self, up_to: Position) -> Result<usize> {
        self.storage.compact(up_to)
    }

    fn share_with_reader(&self) -> ReaderSharedData {
        ReaderSharedData {
            storage: Arc::clone(&self.storage),
            frontier: self.frontier.clone(),
            buffer_closed: self.closed.listener(),
            poll_interval: self.poll_interval,
        }
    }
}

async fn advance_frontier(mut beat: Beat, frontier: Arc<Frontier>, storage: Arc<dyn Storage>) {
    while let Some(tick) = beat.next().await {
        if frontier.advance(storage.total_inserted()) {
            trace!(tick = tick.seq(), frontier = frontier.position(), "frontier advanced");
        }
        // The tick counts as consumed only once the frontier is updated
        drop(tick);
    }
    debug!(frontier = frontier.position(), "frontier advance loop ended");
}

impl fmt::Debug for SyncBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SyncBuffer(total={}, oldest={}, frontier={:?}, join={:?}, closed={})",
            self.storage.total_inserted(),
            self.storage.oldest_available(),
            self.frontier(),
            self.join,
            self.is_closed()
        )
    }
}

impl Drop for SyncBuffer {
    fn drop(&mut self) {
        self.closed.trigger();
        if let Ok(mut advance_task) = self.advance_task.try_lock() {
            if let Some(handle) = advance_task.take() {
                handle.abort();
            }
        }
    }
}
