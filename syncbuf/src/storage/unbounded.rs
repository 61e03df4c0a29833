//! Unbounded log storage
//!
//! Keeps every item until the owner compacts it explicitly.

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use parking_lot::RwLock;

use super::{empty_range, Position, RangeRead, Storage};
use crate::error::Result;

struct LogInner {
    items: VecDeque<Bytes>,
    /// Position of `items[0]`
    base: Position,
}

impl LogInner {
    fn total(&self) -> Position {
        self.base + self.items.len() as Position
    }

    #[allow(clippy::cast_possible_truncation)]
    fn get(&self, position: Position) -> Option<&Bytes> {
        let offset = position.checked_sub(self.base)?;
        self.items.get(offset as usize)
    }
}

/// Append-only log of items
///
/// Memory grows with every `add`. `compact` is the only way to release it and
/// is never triggered automatically.
pub struct LogStorage {
    inner: RwLock<LogInner>,
}

impl LogStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LogInner {
                items: VecDeque::new(),
                base: 0,
            }),
        }
    }

    /// Number of items currently held in memory
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }
}

impl Default for LogStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for LogStorage {
    fn add(&self, item: Bytes) -> Position {
        let mut inner = self.inner.write();
        let position = inner.total();
        inner.items.push_back(item);
        position
    }

    fn read(&self, position: Position) -> Option<Bytes> {
        self.inner.read().get(position).cloned()
    }

    fn total_inserted(&self) -> Position {
        self.inner.read().total()
    }

    fn oldest_available(&self) -> Position {
        self.inner.read().base
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_range_to(&self, from: Position, end: Position) -> RangeRead {
        let inner = self.inner.read();

        let start = from.max(inner.base);
        let end = end.min(inner.total());
        if start >= end {
            return empty_range(start, inner.total());
        }

        let first = (start - inner.base) as usize;
        let last = (end - inner.base) as usize;
        let items = inner.items.range(first..last).cloned().collect();

        RangeRead {
            start,
            items,
            resume: end,
        }
    }

    /// Drop items strictly before `up_to`
    ///
    /// `up_to` is clamped to `total_inserted()`. Positions of the remaining
    /// items do not change.
    #[allow(clippy::cast_possible_truncation)]
    fn compact(&self, up_to: Position) -> Result<usize> {
        let mut inner = self.inner.write();
        let up_to = up_to.min(inner.total());
        if up_to <= inner.base {
            return Ok(0);
        }

        let dropped = (up_to - inner.base) as usize;
        inner.items.drain(..dropped);
        inner.base = up_to;
        tracing::debug!(dropped, base = up_to, "log storage compacted");
        Ok(dropped)
    }
}

impl fmt::Debug for LogStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        write!(
            f,
            "LogStorage(base={}, total={})",
            inner.base,
            inner.total()
        )
    }
}
