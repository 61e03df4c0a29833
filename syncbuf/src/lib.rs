//! # syncbuf - keep readers of a byte stream roughly in sync
//!
//! One writer adds opaque byte items to a `SyncBuffer`; any number of
//! `Reader`s stream them back independently. How fast new items become
//! visible is decided by the buffer's pacing, not by the writer:
//!
//! - `Pacing::Throttle` slows the writer down instead;
//! - `Pacing::Clock` releases one more item per clock tick, from an
//!   `AutonomousClock` (fixed interval) or a `ManualClock` (stepped by hand).
//!
//! Items live in a `RingStorage` (fixed capacity, oldest overwritten) or a
//! `LogStorage` (kept until compacted).
//!
//! ## Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use syncbuf::{Pacing, StoragePolicy, SyncBuffer};
//!
//! # async fn demo() -> Result<(), syncbuf::SyncBufferError> {
//! let (pacing, stepper) = Pacing::manual();
//! let buffer = SyncBuffer::new(StoragePolicy::Log, pacing);
//!
//! buffer.add(&b"hello"[..]).await?;
//! let mut reader = buffer.new_reader();
//! let mut stream = reader.stream();
//!
//! stepper.step().await?;
//! assert_eq!(stream.next().await.as_deref(), Some(&b"hello"[..]));
//!
//! buffer.close().await;
//! reader.close().await;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod clock;
pub mod config;
pub mod cursor;
pub mod error;
pub mod frontier;
mod handoff;
pub mod idgen;
pub mod reader;
mod shutdown;
pub mod storage;

// Re-export the buffer and its readers for convenience
pub use buffer::SyncBuffer;
pub use reader::{Reader, ReaderStream};

pub use clock::{AutonomousClock, Beat, Clock, ManualClock, Stepper, Tick};
pub use config::{Config, JoinPolicy, Options, Pacing, PacingConfig};
pub use cursor::SeekCursor;
pub use error::{Result, SeekError, SyncBufferError};
pub use frontier::Frontier;
pub use idgen::{IdGen, ReaderId};
pub use storage::{LogStorage, Position, RangeRead, RingStorage, Storage, StoragePolicy};
