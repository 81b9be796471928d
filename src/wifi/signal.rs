//! Set-once outcome latch between the event context and the waiting caller.
//!
//! Backed by a `tokio` one-shot channel: the sender half is consumed by the
//! first [`OutcomeSender::set`], and [`OutcomeReceiver::wait`] observes a
//! value that was sent before the wait started.

use super::machine::Outcome;
use tokio::sync::oneshot;

/// Create a connected sender/receiver pair.
pub fn outcome_signal() -> (OutcomeSender, OutcomeReceiver) {
    let (tx, rx) = oneshot::channel();
    (OutcomeSender { tx: Some(tx) }, OutcomeReceiver { rx })
}

/// Writer half, owned by the event handler.
#[derive(Debug)]
pub struct OutcomeSender {
    tx: Option<oneshot::Sender<Outcome>>,
}

impl OutcomeSender {
    /// Publish the outcome. Only the first call has any effect.
    ///
    /// Returns `false` if an outcome was already set or nobody is waiting.
    pub fn set(&mut self, outcome: Outcome) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Whether an outcome has been published.
    pub fn is_set(&self) -> bool {
        self.tx.is_none()
    }
}

/// Reader half, consumed by the blocking wait.
#[derive(Debug)]
pub struct OutcomeReceiver {
    rx: oneshot::Receiver<Outcome>,
}

impl OutcomeReceiver {
    /// Block the current thread until an outcome is published.
    ///
    /// Returns `Err(SignalLost)` if the sender was dropped without setting
    /// anything. Must not be called from within an async runtime.
    pub fn wait(self) -> Result<Outcome, SignalLost> {
        self.rx.blocking_recv().map_err(|_| SignalLost)
    }
}

/// The sender went away before publishing an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalLost;
