//! Visibility frontier
//!
//! The position up to which items are releasable to readers of a
//! clock-driven buffer. Written by exactly one task (the buffer's advance
//! loop), read by every reader.

use std::fmt;

use parking_lot::RwLock;

use crate::storage::Position;

pub struct Frontier {
    position: RwLock<Position>,
}

impl Frontier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            position: RwLock::new(0),
        }
    }

    /// Current frontier; items at positions below it are visible
    #[must_use]
    pub fn position(&self) -> Position {
        *self.position.read()
    }

    /// Move one position forward, but never past `limit`
    ///
    /// Returns `true` if the frontier moved.
    pub fn advance(&self, limit: Position) -> bool {
        let mut position = self.position.write();
        if *position < limit {
            *position += 1;
            true
        } else {
            false
        }
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Frontier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frontier({})", self.position())
    }
}
