//! Backpressure credits.
//!
//! Every write hands the producer a [`Release`] future that resolves once the scheduler
//! has delivered a frame and is ready for more data. Each producer owns a single credit
//! slot: writing again before the previous credit was released overwrites it, and the
//! overwritten credit only resolves once the producer detaches or the stream ends.

use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot::{self, error::TryRecvError};

/// Identifies a producer attached to a stream.
pub type ProducerId = u64;

/// How a pending [`Release`] was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// A frame was delivered, the producer may write again.
    Released,

    /// The stream ended before the credit was released.
    Ended,
}

/// Resolves when the producer may submit its next chunk.
#[derive(Debug)]
#[must_use = "a Release does nothing unless awaited or polled"]
pub struct Release {
    rx: oneshot::Receiver<ReleaseOutcome>,
    outcome: Option<ReleaseOutcome>,
}

impl Release {
    pub(crate) fn pair() -> (oneshot::Sender<ReleaseOutcome>, Release) {
        let (tx, rx) = oneshot::channel();
        (tx, Release { rx, outcome: None })
    }

    /// Checks for an outcome without waiting.
    pub fn try_outcome(&mut self) -> Option<ReleaseOutcome> {
        if self.outcome.is_none() {
            self.outcome = match self.rx.try_recv() {
                Ok(outcome) => Some(outcome),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(ReleaseOutcome::Ended),
            };
        }
        self.outcome
    }

    pub fn is_released(&mut self) -> bool {
        self.try_outcome() == Some(ReleaseOutcome::Released)
    }
}

impl Future for Release {
    type Output = ReleaseOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.outcome {
            return Poll::Ready(outcome);
        }

        let outcome = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(_)) => ReleaseOutcome::Ended,
            Poll::Pending => return Poll::Pending,
        };
        self.outcome = Some(outcome);
        Poll::Ready(outcome)
    }
}

/// Pending credits, at most one per producer, released in write order.
#[derive(Debug, Default)]
pub struct ReleaseSlots {
    pending: VecDeque<(ProducerId, oneshot::Sender<ReleaseOutcome>)>,
    /// Overwritten credits, never released
    superseded: Vec<(ProducerId, oneshot::Sender<ReleaseOutcome>)>,
}

impl ReleaseSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a credit for `producer`, overwriting its previous one.
    pub fn store(&mut self, producer: ProducerId, tx: oneshot::Sender<ReleaseOutcome>) {
        match self.pending.iter_mut().find(|(id, _)| *id == producer) {
            Some((_, slot)) => {
                let old = std::mem::replace(slot, tx);
                trace!("Producer {producer} wrote again before release, overwriting credit");
                self.superseded.retain(|(_, tx)| !tx.is_closed());
                self.superseded.push((producer, old));
            }
            None => self.pending.push_back((producer, tx)),
        }
    }

    /// Releases the oldest pending credit. Returns false if none was pending.
    pub fn release_next(&mut self) -> bool {
        while let Some((_, tx)) = self.pending.pop_front() {
            // A dropped Release is fine, but it does not count as a release
            if tx.send(ReleaseOutcome::Released).is_ok() {
                return true;
            }
        }
        false
    }

    /// Resolves the credits of `producer`, if any, as ended.
    pub fn cancel(&mut self, producer: ProducerId) {
        if let Some(index) = self.pending.iter().position(|(id, _)| *id == producer) {
            if let Some((_, tx)) = self.pending.remove(index) {
                let _ = tx.send(ReleaseOutcome::Ended);
            }
        }

        let (ended, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.superseded)
            .into_iter()
            .partition(|(id, _)| *id == producer);
        self.superseded = kept;
        for (_, tx) in ended {
            let _ = tx.send(ReleaseOutcome::Ended);
        }
    }

    /// Resolves every pending and overwritten credit as ended.
    pub fn cancel_all(&mut self) {
        let credits = self.pending.drain(..).chain(self.superseded.drain(..));
        for (_, tx) in credits {
            let _ = tx.send(ReleaseOutcome::Ended);
        }
    }

    pub fn is_pending(&self, producer: ProducerId) -> bool {
        self.pending.iter().any(|(id, _)| *id == producer)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
