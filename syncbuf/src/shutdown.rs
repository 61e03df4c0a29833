//! One-way shutdown signal
//!
//! A `Shutdown` is owned by whoever decides to stop (a buffer, a reader, a
//! clock). Background loops hold a `ShutdownListener` and check it alongside
//! their other work. Dropping the `Shutdown` counts as triggering it, so a
//! forgotten owner can never leave a loop waiting forever.

use tokio::sync::watch;

#[derive(Debug)]
pub(crate) struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Trigger the signal
    ///
    /// Returns `true` only for the call that actually flipped it.
    pub(crate) fn trigger(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub(crate) fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl ShutdownListener {
    pub(crate) fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the signal is triggered or its owner is gone
    pub(crate) async fn triggered(&mut self) {
        // Err means the owner was dropped, which is as final as a trigger
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
