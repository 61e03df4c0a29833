//! Clocks
//!
//! A clock produces the cadence that advances a buffer's frontier. Its
//! `beat()` is a stream with one `Tick` per cadence unit; taking a tick from
//! the stream is how the consumer receives it.
//!
//! Ticks go through a zero-capacity handoff (see `crate::handoff`): a clock
//! never has more than one tick in flight and cannot get ahead of its consumer.
//!
//! - `AutonomousClock` offers a tick, waits for it to be taken, then sleeps
//!   for its interval.
//! - `ManualClock` ticks only when its `Stepper` is stepped. `step()` returns
//!   once the consumer has dropped the tick, which gives tests a
//!   synchronization point.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Result, SyncBufferError};
use crate::handoff::{self, HandoffReceiver, HandoffSender};
use crate::shutdown::{Shutdown, ShutdownListener};

/// One cadence signal
///
/// Dropping the tick marks it as consumed.
pub struct Tick {
    seq: u64,
    consumed: Option<oneshot::Sender<()>>,
}

impl Tick {
    fn new(seq: u64, consumed: Option<oneshot::Sender<()>>) -> Self {
        Self { seq, consumed }
    }

    /// Sequence number, starting at 0 for the first tick of a clock
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Drop for Tick {
    fn drop(&mut self) {
        if let Some(consumed) = self.consumed.take() {
            // The stepper may have given up waiting; nothing to report then
            let _ = consumed.send(());
        }
    }
}

impl fmt::Debug for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tick({})", self.seq)
    }
}

/// Stream of ticks returned by `Clock::beat`
pub type Beat = BoxStream<'static, Tick>;

/// Source of cadence signals
pub trait Clock: Send + Sync {
    /// The tick sequence
    ///
    /// A clock has a single consumer: only the first call returns live ticks,
    /// later calls get a stream that has already ended.
    fn beat(&self) -> Beat;

    /// End the tick sequence and wait until the clock is torn down
    ///
    /// Idempotent. Pending and future consumers of `beat()` observe the end
    /// of the stream instead of hanging.
    fn stop(&self) -> BoxFuture<'_, ()>;

    /// Wall-clock cadence, if the clock has one
    fn interval(&self) -> Option<Duration> {
        None
    }
}

/// Tick stream that ends as soon as `stop` is triggered
fn guarded(ticks: HandoffReceiver<Tick>, stop: ShutdownListener) -> Beat {
    futures::stream::unfold((ticks, stop), |(mut ticks, mut stop)| async move {
        if stop.is_triggered() {
            return None;
        }
        tokio::select! {
            biased;
            () = stop.triggered() => None,
            tick = ticks.recv() => tick.map(|tick| (tick, (ticks, stop))),
        }
    })
    .boxed()
}

fn take_beat(ticks: &Mutex<Option<HandoffReceiver<Tick>>>, stop: &Shutdown, hint: &str) -> Beat {
    match ticks.lock().take() {
        Some(ticks) => guarded(ticks, stop.listener()),
        None => {
            log::warn!("{hint}.beat() called again; the tick stream has a single consumer");
            futures::stream::empty().boxed()
        }
    }
}

// ============================================================================
// Autonomous clock
// ============================================================================

/// Clock ticking at a fixed wall-clock interval
///
/// The producer task starts at construction, so `new` must be called from
/// within a tokio runtime. The first tick is available immediately.
pub struct AutonomousClock {
    interval: Duration,
    stop: Shutdown,
    ticks: Mutex<Option<HandoffReceiver<Tick>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AutonomousClock {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        let (tx, rx) = handoff::channel();
        let stop = Shutdown::new();
        let task = tokio::spawn(produce_ticks(tx, interval, stop.listener()));

        Self {
            interval,
            stop,
            ticks: Mutex::new(Some(rx)),
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }
}

async fn produce_ticks(
    mut ticks: HandoffSender<Tick>,
    interval: Duration,
    mut stop: ShutdownListener,
) {
    let mut seq = 0;
    loop {
        tokio::select! {
            biased;
            () = stop.triggered() => break,
            sent = ticks.send(Tick::new(seq, None)) => {
                if sent.is_err() {
                    debug!("autonomous clock: beat dropped by its consumer");
                    break;
                }
            }
        }
        trace!(seq, "tick taken");
        seq += 1;

        tokio::select! {
            biased;
            () = stop.triggered() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
    debug!(ticks = seq, "autonomous clock stopped");
}

impl Clock for AutonomousClock {
    fn beat(&self) -> Beat {
        take_beat(&self.ticks, &self.stop, "AutonomousClock")
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        async move {
            self.stop.trigger();
            // Held across the join so concurrent callers all wait for teardown
            let mut task = self.task.lock().await;
            if let Some(handle) = task.take() {
                if let Err(e) = handle.await {
                    warn!("autonomous clock task failed: {e}");
                }
            }
        }
        .boxed()
    }

    fn interval(&self) -> Option<Duration> {
        Some(self.interval)
    }
}

impl fmt::Debug for AutonomousClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AutonomousClock(interval={:?}, stopped={})",
            self.interval,
            self.stop.is_triggered()
        )
    }
}

// ============================================================================
// Manual clock
// ============================================================================

/// Clock that ticks only when stepped
pub struct ManualClock {
    stop: Shutdown,
    ticks: Mutex<Option<HandoffReceiver<Tick>>>,
}

/// Control side of a `ManualClock`
pub struct Stepper {
    ticks: tokio::sync::Mutex<HandoffSender<Tick>>,
    stop: ShutdownListener,
    next_seq: AtomicU64,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> (Self, Stepper) {
        let (tx, rx) = handoff::channel();
        let stop = Shutdown::new();
        let stepper = Stepper {
            ticks: tokio::sync::Mutex::new(tx),
            stop: stop.listener(),
            next_seq: AtomicU64::new(0),
        };
        let clock = Self {
            stop,
            ticks: Mutex::new(Some(rx)),
        };
        (clock, stepper)
    }
}

impl Clock for ManualClock {
    fn beat(&self) -> Beat {
        take_beat(&self.ticks, &self.stop, "ManualClock")
    }

    fn stop(&self) -> BoxFuture<'_, ()> {
        async move {
            if self.stop.trigger() {
                debug!("manual clock stopped");
            }
        }
        .boxed()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ManualClock(stopped={})", self.stop.is_triggered())
    }
}

impl Stepper {
    /// Fire one tick and wait until the clock's consumer has processed it
    ///
    /// # Errors
    ///
    /// Returns `ClockStopped` if the clock is (or becomes) stopped before the
    /// tick was taken, or if nobody consumes the beat any more.
    pub async fn step(&self) -> Result<()> {
        let mut stop = self.stop.clone();
        if stop.is_triggered() {
            return Err(SyncBufferError::ClockStopped);
        }

        let mut ticks = tokio::select! {
            biased;
            () = stop.triggered() => return Err(SyncBufferError::ClockStopped),
            ticks = self.ticks.lock() => ticks,
        };

        let (consumed_tx, consumed) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        tokio::select! {
            biased;
            () = stop.triggered() => return Err(SyncBufferError::ClockStopped),
            sent = ticks.send(Tick::new(seq, Some(consumed_tx))) => {
                sent.map_err(|_| SyncBufferError::ClockStopped)?;
            }
        }
        drop(ticks);

        // Resolves when the consumer drops the tick
        let _ = consumed.await;
        trace!(seq, "manual tick consumed");
        Ok(())
    }

    /// Number of ticks fired so far
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.next_seq.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Stepper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stepper(steps={})", self.steps())
    }
}
