//! Bounded ring storage
//!
//! Fixed number of slots; when full, each `add` overwrites the oldest item.
//! Only positions in `[total - capacity, total)` are retrievable.

use std::fmt;
use std::num::NonZeroUsize;

use bytes::Bytes;
use parking_lot::RwLock;

use super::{empty_range, Position, RangeRead, Storage};

struct RingInner {
    slots: Vec<Bytes>,
    total: Position,
}

impl RingInner {
    fn capacity(&self) -> Position {
        self.slots.len() as Position
    }

    fn oldest(&self) -> Position {
        self.total.saturating_sub(self.capacity())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn index(&self, position: Position) -> usize {
        (position % self.capacity()) as usize
    }
}

/// Fixed-size ring of items
///
/// # Thread Safety
///
/// All state lives behind one `parking_lot::RwLock`: `add` takes the write
/// lock, every read takes the read lock, so a reader never observes a
/// half-applied overwrite.
pub struct RingStorage {
    inner: RwLock<RingInner>,
}

impl RingStorage {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: RwLock::new(RingInner {
                slots: vec![Bytes::new(); capacity.get()],
                total: 0,
            }),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.read().slots.len()
    }
}

impl Storage for RingStorage {
    fn add(&self, item: Bytes) -> Position {
        let mut inner = self.inner.write();
        let position = inner.total;
        let index = inner.index(position);
        inner.slots[index] = item;
        inner.total += 1;
        position
    }

    fn read(&self, position: Position) -> Option<Bytes> {
        let inner = self.inner.read();
        if position >= inner.total || position < inner.oldest() {
            return None;
        }
        Some(inner.slots[inner.index(position)].clone())
    }

    fn total_inserted(&self) -> Position {
        self.inner.read().total
    }

    fn oldest_available(&self) -> Position {
        self.inner.read().oldest()
    }

    fn read_range_to(&self, from: Position, end: Position) -> RangeRead {
        let inner = self.inner.read();

        // A cursor older than the oldest slot jumps forward to it.
        let start = from.max(inner.oldest());
        let end = end.min(inner.total);

        // This is how callers are told to back off.
        if start >= end {
            return empty_range(start, inner.total);
        }

        let items = (start..end)
            .map(|position| inner.slots[inner.index(position)].clone())
            .collect();

        RangeRead {
            start,
            items,
            resume: end,
        }
    }
}

impl fmt::Debug for RingStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        write!(
            f,
            "RingStorage(capacity={}, total={}, oldest={})",
            inner.slots.len(),
            inner.total,
            inner.oldest()
        )
    }
}
