//! Buffer configuration
//!
//! `Pacing` and `Options` are what `SyncBuffer` is built from in code.
//! `Config` is the serializable description of a whole deployment, for
//! services that keep it in a JSON file:
//!
//! ```json
//! {
//!   "storage": { "ring": { "capacity": 1024 } },
//!   "pacing": { "autonomous": { "interval_ms": 40 } },
//!   "join": "retained_history",
//!   "poll_interval_ms": 4
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::clock::{AutonomousClock, Clock, ManualClock, Stepper};
use crate::error::Result;
use crate::storage::StoragePolicy;

/// Backoff used by readers of a buffer whose clock has no interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Shortest backoff a reader will use
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Where a new reader starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Start at the current visible end: only items that become visible later
    Tail,
    /// Start at position 0 (with a catch-up jump if it is no longer retained)
    Replay,
    /// Start at the oldest retained item
    #[default]
    RetainedHistory,
}

/// How a buffer paces its consumers
#[derive(Clone)]
pub enum Pacing {
    /// `add` waits this long after appending; readers see every added item
    Throttle(Duration),
    /// `add` never waits; each clock tick makes one more item visible
    Clock(Arc<dyn Clock>),
}

impl Pacing {
    /// Clock-driven pacing with a fixed tick interval
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn autonomous(interval: Duration) -> Self {
        Self::Clock(Arc::new(AutonomousClock::new(interval)))
    }

    /// Clock-driven pacing stepped by hand
    #[must_use]
    pub fn manual() -> (Self, Stepper) {
        let (clock, stepper) = ManualClock::new();
        (Self::Clock(Arc::new(clock)), stepper)
    }

    /// Cadence of the pacing, if it is wall-clock based
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        match self {
            Self::Throttle(interval) => Some(*interval),
            Self::Clock(clock) => clock.interval(),
        }
    }
}

impl fmt::Debug for Pacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throttle(interval) => write!(f, "Pacing::Throttle({interval:?})"),
            Self::Clock(clock) => write!(f, "Pacing::Clock(interval={:?})", clock.interval()),
        }
    }
}

/// Reader-facing options of a buffer, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    pub join: JoinPolicy,
    /// Backoff of a reader that found nothing new; derived from the pacing
    /// when `None`
    pub poll_interval: Option<Duration>,
}

impl Options {
    /// Backoff for readers: the explicit value, else a tenth of the pacing
    /// interval, else `DEFAULT_POLL_INTERVAL`
    #[must_use]
    pub fn resolve_poll_interval(&self, pacing: &Pacing) -> Duration {
        self.poll_interval
            .or_else(|| pacing.interval().map(|interval| interval / 10))
            .unwrap_or(DEFAULT_POLL_INTERVAL)
            .max(MIN_POLL_INTERVAL)
    }
}

/// Serializable pacing description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacingConfig {
    Throttle { interval_ms: u64 },
    Autonomous { interval_ms: u64 },
    Manual,
}

/// Serializable description of a buffer deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub storage: StoragePolicy,
    pub pacing: PacingConfig,
    #[serde(default)]
    pub join: JoinPolicy,
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

impl Config {
    /// Parse a JSON config
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid JSON, cannot be read, or
    /// does not describe a config.
    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Parse a JSON config from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string does not describe a config.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Everything `SyncBuffer::with_options` needs
    ///
    /// The stepper is present only for a manual clock. Building an autonomous
    /// clock spawns its task, so this must run within a tokio runtime.
    #[must_use]
    pub fn into_parts(self) -> (StoragePolicy, Pacing, Option<Stepper>, Options) {
        let (pacing, stepper) = match self.pacing {
            PacingConfig::Throttle { interval_ms } => {
                (Pacing::Throttle(Duration::from_millis(interval_ms)), None)
            }
            PacingConfig::Autonomous { interval_ms } => {
                (Pacing::autonomous(Duration::from_millis(interval_ms)), None)
            }
            PacingConfig::Manual => {
                let (pacing, stepper) = Pacing::manual();
                (pacing, Some(stepper))
            }
        };
        let options = Options {
            join: self.join,
            poll_interval: self.poll_interval_ms.map(Duration::from_millis),
        };
        (self.storage, pacing, stepper, options)
    }
}
