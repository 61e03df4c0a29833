//! Seekable cursor over a storage
//!
//! Random-access companion to the streaming readers: inspect items one by
//! one, jump around, or collect everything from a position onwards. Unlike a
//! reader cursor it may move backwards, but only onto written positions.

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Result, SeekError};
use crate::storage::{Position, Storage};

pub struct SeekCursor {
    storage: Arc<dyn Storage>,
    position: Mutex<Position>,
}

impl SeekCursor {
    /// Cursor at the oldest retained item of `storage`
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let position = storage.oldest_available();
        Self {
            storage,
            position: Mutex::new(position),
        }
    }

    #[must_use]
    pub fn position(&self) -> Position {
        *self.position.lock()
    }

    /// Step to the next item
    ///
    /// At the newest item this is a no-op and returns `false`.
    pub fn increment(&self) -> bool {
        self.seek(SeekFrom::Current(1)).is_ok()
    }

    /// Move the cursor, returning the new position
    ///
    /// Valid targets are the written positions `0..total_inserted`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSeek` if the target lies before position 0 or at or
    /// past the end of the written data. The cursor does not move then.
    pub fn seek(&self, target: SeekFrom) -> Result<Position> {
        let total = self.storage.total_inserted();
        let mut position = self.position.lock();

        let target = match target {
            SeekFrom::Start(target) => target,
            SeekFrom::Current(offset) => offset_from(*position, offset, total)?,
            SeekFrom::End(offset) => offset_from(total, offset, total)?,
        };
        if target >= total {
            return Err(SeekError::BeyondEnd { target, total }.into());
        }

        *position = target;
        Ok(target)
    }

    /// Item under the cursor, if still retained
    #[must_use]
    pub fn read(&self) -> Option<Bytes> {
        self.storage.read(self.position())
    }

    /// Everything from the cursor to the newest item, as one chunk
    #[must_use]
    pub fn rest(&self) -> Bytes {
        self.storage.rest(self.position())
    }
}

fn offset_from(from: Position, offset: i64, total: Position) -> Result<Position, SeekError> {
    from.checked_add_signed(offset).ok_or(if offset < 0 {
        SeekError::BeforeStart { from, offset }
    } else {
        SeekError::BeyondEnd {
            target: Position::MAX,
            total,
        }
    })
}

impl fmt::Debug for SeekCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SeekCursor(position={}, total={})",
            self.position(),
            self.storage.total_inserted()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LogStorage;
    use crate::SyncBufferError;

    fn cursor_over(items: &[&'static [u8]]) -> SeekCursor {
        let storage = LogStorage::new();
        for item in items {
            storage.add(Bytes::from_static(item));
        }
        SeekCursor::new(Arc::new(storage))
    }

    #[test]
    fn test_increment_then_rest() {
        let cursor = cursor_over(&[b"{0}", b"{1}", b"{2}"]);
        assert_eq!(cursor.position(), 0);

        assert!(cursor.increment());
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.read(), Some(Bytes::from_static(b"{1}")));
        assert_eq!(cursor.rest(), Bytes::from_static(b"{1}{2}"));
    }

    #[test]
    fn test_increment_stops_at_last_item() {
        let cursor = cursor_over(&[b"a", b"b"]);
        assert!(cursor.increment());
        assert!(!cursor.increment());
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_seek_variants() {
        let cursor = cursor_over(&[b"a", b"b", b"c", b"d"]);

        assert_eq!(cursor.seek(SeekFrom::Start(2)).unwrap(), 2);
        assert_eq!(cursor.seek(SeekFrom::Current(-1)).unwrap(), 1);
        assert_eq!(cursor.seek(SeekFrom::End(-1)).unwrap(), 3);
        assert_eq!(cursor.read(), Some(Bytes::from_static(b"d")));
    }

    #[test]
    fn test_seek_before_start() {
        let cursor = cursor_over(&[b"a", b"b"]);
        cursor.seek(SeekFrom::Start(1)).unwrap();

        let err = cursor.seek(SeekFrom::Current(-2)).unwrap_err();
        assert!(matches!(
            err,
            SyncBufferError::InvalidSeek(SeekError::BeforeStart { from: 1, offset: -2 })
        ));
        // Unchanged
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_seek_beyond_end() {
        let cursor = cursor_over(&[b"a", b"b"]);

        let err = cursor.seek(SeekFrom::Start(2)).unwrap_err();
        assert!(matches!(
            err,
            SyncBufferError::InvalidSeek(SeekError::BeyondEnd { target: 2, total: 2 })
        ));
        assert!(cursor.seek(SeekFrom::End(0)).is_err());
        assert!(cursor.seek(SeekFrom::Current(i64::MAX)).is_err());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_seek_on_empty_storage() {
        let cursor = cursor_over(&[]);
        assert!(cursor.seek(SeekFrom::Start(0)).is_err());
        assert!(!cursor.increment());
        assert!(cursor.read().is_none());
        assert!(cursor.rest().is_empty());
    }
}
