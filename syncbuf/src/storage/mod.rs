//! Item storage
//!
//! Holds inserted items and serves positional reads.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  SyncBuffer (coordination layer)    │
//! │  - frontier advanced by a clock     │
//! │  - readers polling up to frontier   │
//! └─────────────────────────────────────┘
//!          ▲
//!          │ uses Storage for items
//!          ▼
//! ┌─────────────────────────────────────┐
//! │  Storage (shared item sequence)     │
//! │  - add() assigns positions          │
//! │  - read_range() for catching up     │
//! │  - rest() for the shutdown flush    │
//! └─────────────────────────────────────┘
//!      ▲                   ▲
//!      │                   │
//!  RingStorage         LogStorage
//!  (fixed capacity,    (keeps everything,
//!   overwrites)         explicit compact)
//! ```
//!
//! Positions are logical: the first item ever added is position 0 and each
//! `add` hands out the next integer. Retention policies only decide which
//! positions are still retrievable; they never renumber items.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use serde::Deserialize;

use crate::error::{Result, SyncBufferError};

pub mod ring;
pub mod unbounded;

pub use self::ring::RingStorage;
pub use self::unbounded::LogStorage;

/// Zero-based logical index into the item sequence
pub type Position = u64;

/// Result of a range read
///
/// An empty `items` is the "nothing new yet" signal; callers back off and
/// retry from `resume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRead {
    /// Position of the first returned item (the requested position, clamped
    /// up to the oldest retained one)
    pub start: Position,
    pub items: Vec<Bytes>,
    /// Where the next read should start
    pub resume: Position,
}

impl RangeRead {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Shared item storage
///
/// Implementations are safe for one writer and many concurrent readers.
pub trait Storage: Send + Sync {
    /// Append an item and return its position
    fn add(&self, item: Bytes) -> Position;

    /// Item at `position`, or `None` if not written yet or no longer retained
    fn read(&self, position: Position) -> Option<Bytes>;

    /// Number of items ever added
    fn total_inserted(&self) -> Position;

    /// Oldest position still retrievable
    fn oldest_available(&self) -> Position;

    /// Read retained items from `from` up to (not including) `end`
    ///
    /// `from` is clamped up to `oldest_available()`. `end` is clamped down to
    /// `total_inserted()`.
    fn read_range_to(&self, from: Position, end: Position) -> RangeRead;

    /// Read all retained items from `from` to the newest one
    fn read_range(&self, from: Position) -> RangeRead {
        self.read_range_to(from, Position::MAX)
    }

    /// Concatenation of all retained items from `from` to the newest one
    fn rest(&self, from: Position) -> Bytes {
        let range = self.read_range(from);
        concat(&range.items)
    }

    /// Drop items strictly before `up_to`, returning how many were dropped
    ///
    /// # Errors
    ///
    /// Returns `CompactionUnsupported` for storages that manage retention on
    /// their own.
    fn compact(&self, _up_to: Position) -> Result<usize> {
        Err(SyncBufferError::CompactionUnsupported)
    }
}

/// Retention policy, used to build a storage for a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePolicy {
    /// Fixed capacity, the oldest item is overwritten when full
    Ring { capacity: NonZeroUsize },
    /// Keeps everything until compacted
    Log,
}

impl StoragePolicy {
    #[must_use]
    pub fn build(self) -> Arc<dyn Storage> {
        match self {
            Self::Ring { capacity } => Arc::new(RingStorage::new(capacity)),
            Self::Log => Arc::new(LogStorage::new()),
        }
    }
}

/// Empty result for a read that found nothing at or after `start`
///
/// Past the newest item the read resumes at `total`; below it (a range cut
/// short by the caller's end) it resumes where it started.
pub(crate) fn empty_range(start: Position, total: Position) -> RangeRead {
    RangeRead {
        start,
        items: Vec::new(),
        resume: start.min(total),
    }
}

pub(crate) fn concat(items: &[Bytes]) -> Bytes {
    match items {
        [] => Bytes::new(),
        [single] => single.clone(),
        _ => {
            let len = items.iter().map(Bytes::len).sum();
            let mut packet = BytesMut::with_capacity(len);
            for item in items {
                packet.extend_from_slice(item);
            }
            packet.freeze()
        }
    }
}
