//! Connection lifecycle state machine.

use std::sync::OnceLock;

use tokio::sync::watch;

use crate::error::{CloseReason, ConnectionError};

/// Observable state of a stream connection.
///
/// `Connecting` is entered both on the initial connect and whenever the
/// reconnect supervisor is between transports. Once `Closed` is reached no
/// further transition occurs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport yet.
    Disconnected,
    /// A transport connect and hello exchange is in progress.
    Connecting,
    /// Frames are flowing.
    Connected,
    /// Teardown has begun; the read task is draining.
    Closing,
    /// Terminal. Consult the close reason for how it ended.
    Closed,
}

/// Shared lifecycle cell: the current state plus the terminal close reason.
///
/// The close reason is recorded once; later teardown paths observe the first
/// recorded reason, which keeps `close()` idempotent.
pub(crate) struct Lifecycle {
    tx: watch::Sender<ConnectionState>,
    reason: OnceLock<CloseReason>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            tx,
            reason: OnceLock::new(),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState { *self.tx.borrow() }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionState> { self.tx.subscribe() }

    /// Attempt a transition; returns `false` when the current state forbids
    /// it. `Closing` only advances to `Closed`, and `Closed` is final.
    pub(crate) fn transition(&self, next: ConnectionState) -> bool {
        let mut moved = false;
        self.tx.send_modify(|state| {
            let allowed = match *state {
                ConnectionState::Closed => false,
                ConnectionState::Closing => next == ConnectionState::Closed,
                _ => true,
            };
            if allowed && *state != next {
                *state = next;
                moved = true;
            }
        });
        moved
    }

    /// Record the terminal reason (first writer wins) and move to `Closing`.
    pub(crate) fn begin_close(&self, reason: CloseReason) {
        let _ = self.reason.set(reason);
        self.transition(ConnectionState::Closing);
    }

    /// Reach the terminal state with `reason` unless one is already recorded.
    pub(crate) fn finish_close(&self, reason: CloseReason) {
        let _ = self.reason.set(reason);
        self.transition(ConnectionState::Closed);
    }

    pub(crate) fn close_reason(&self) -> Option<&CloseReason> { self.reason.get() }

    pub(crate) fn is_closed(&self) -> bool { self.state() == ConnectionState::Closed }

    /// Await the terminal state; resolves immediately if already closed.
    pub(crate) async fn wait_closed(&self) -> Result<(), ConnectionError> {
        let mut rx = self.tx.subscribe();
        // wait_for inspects the current value first, so a connection that is
        // already closed resolves without suspending.
        let _ = rx
            .wait_for(|state| *state == ConnectionState::Closed)
            .await;
        match self.reason.get() {
            None | Some(CloseReason::Graceful) => Ok(()),
            Some(reason) => Err(ConnectionError::from_close_reason(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_is_final() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.transition(ConnectionState::Connecting));
        assert!(lifecycle.transition(ConnectionState::Connected));
        lifecycle.begin_close(CloseReason::Graceful);
        assert_eq!(lifecycle.state(), ConnectionState::Closing);
        assert!(!lifecycle.transition(ConnectionState::Connected));
        lifecycle.finish_close(CloseReason::Graceful);
        assert!(lifecycle.is_closed());
        assert!(!lifecycle.transition(ConnectionState::Connecting));
    }

    #[test]
    fn first_close_reason_wins() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_close(CloseReason::ReconnectExhausted { attempts: 3 });
        lifecycle.finish_close(CloseReason::Graceful);
        assert!(matches!(
            lifecycle.close_reason(),
            Some(CloseReason::ReconnectExhausted { attempts: 3 })
        ));
    }

    #[tokio::test]
    async fn wait_closed_resolves_immediately_when_already_closed() {
        let lifecycle = Lifecycle::new();
        lifecycle.finish_close(CloseReason::Graceful);
        assert!(lifecycle.wait_closed().await.is_ok());
    }

    #[tokio::test]
    async fn wait_closed_reports_abnormal_teardown() {
        let lifecycle = Lifecycle::new();
        lifecycle.finish_close(CloseReason::ReconnectExhausted { attempts: 2 });
        assert!(matches!(
            lifecycle.wait_closed().await,
            Err(ConnectionError::ReconnectExhausted { attempts: 2 })
        ));
    }
}
