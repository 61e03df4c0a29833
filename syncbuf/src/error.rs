//! Error types for buffer, cursor and clock operations
//!
//! Only direct callers ever see these errors. Readers never surface an error
//! through their stream: a stream either ends cleanly or ends after one final
//! flushed chunk.

use crate::storage::Position;

/// Error type for syncbuf operations
#[derive(Debug, thiserror::Error)]
pub enum SyncBufferError {
    #[error("invalid seek: {0}")]
    InvalidSeek(#[from] SeekError),

    #[error("buffer is closed")]
    Closed,

    #[error("clock is stopped")]
    ClockStopped,

    #[error("storage does not support compaction")]
    CompactionUnsupported,

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Why a cursor seek was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SeekError {
    #[error("cannot seek past the start of the buffer (from {from}, by {offset})")]
    BeforeStart { from: Position, offset: i64 },

    #[error("cannot seek past the end of the buffer (target {target}, {total} items written)")]
    BeyondEnd { target: Position, total: Position },
}

pub type Result<T, E = SyncBufferError> = std::result::Result<T, E>;
