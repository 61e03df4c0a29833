//! Zero-capacity handoff
//!
//! A rendezvous between one producer and one consumer: `send` returns only
//! once the consumer has taken the value. Used for clock ticks and for reader
//! output, so neither a clock nor a reader can run ahead of whoever consumes it.
//!
//! The consumer drives the exchange. Each time it wants a value it posts a
//! one-shot slot to the producer and waits on it:
//!
//! ```text
//! consumer                      producer
//! --------                      --------
//! post slot  ───── requests ──▶ recv slot
//! wait slot                     fill slot   (send returns)
//! take value ◀──── slot ───────
//! ```
//!
//! Filling a slot is synchronous, so a producer that gives up while waiting
//! for a slot (e.g. inside `tokio::select!`) never leaves a half-delivered
//! value behind. The consumer keeps at most one slot posted and reuses it
//! across polls.

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, oneshot};

/// The other side of the handoff is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Disconnected;

pub(crate) fn channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        HandoffSender { requests: rx },
        HandoffReceiver {
            requests: tx,
            pending: None,
        },
    )
}

#[derive(Debug)]
pub(crate) struct HandoffSender<T> {
    requests: mpsc::UnboundedReceiver<oneshot::Sender<T>>,
}

impl<T> HandoffSender<T> {
    /// Hand `value` to the consumer, waiting until it asks for one
    ///
    /// Cancel safe: if the future is dropped before completion the value has
    /// not been delivered.
    pub(crate) async fn send(&mut self, mut value: T) -> Result<(), Disconnected> {
        loop {
            let Some(slot) = self.requests.recv().await else {
                return Err(Disconnected);
            };
            // A slot whose receiver is gone belongs to a consumer that was
            // dropped; the request queue will report it on the next turn.
            match slot.send(value) {
                Ok(()) => return Ok(()),
                Err(returned) => value = returned,
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct HandoffReceiver<T> {
    requests: mpsc::UnboundedSender<oneshot::Sender<T>>,
    pending: Option<oneshot::Receiver<T>>,
}

impl<T> HandoffReceiver<T> {
    pub(crate) fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        if self.pending.is_none() {
            let (slot, rx) = oneshot::channel();
            if self.requests.send(slot).is_err() {
                return Poll::Ready(None);
            }
            self.pending = Some(rx);
        }
        let Some(pending) = self.pending.as_mut() else {
            return Poll::Ready(None);
        };

        let taken = ready!(Pin::new(pending).poll(cx));
        self.pending = None;
        // Err: the producer dropped our slot, i.e. it is gone
        Poll::Ready(taken.ok())
    }

    pub(crate) async fn recv(&mut self) -> Option<T> {
        poll_fn(|cx| self.poll_recv(cx)).await
    }
}

impl<T> Stream for HandoffReceiver<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().poll_recv(cx)
    }
}
