//! Upstream stream connection: device-to-network traffic and the
//! MIC-challenge acknowledgment protocol.
//!
//! The RAN pushes [`UpstreamMessage`]s on this stream; for each delivered
//! message the consumer owes exactly one [`UpstreamConnection::acknowledge`]
//! or [`UpstreamConnection::reject`]. The answer names one candidate device
//! and one offered MIC value; the connection checks membership against the
//! delivered challenge but never computes a MIC itself.

pub mod manager;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::warn;

use crate::{
    connection::{ConnectionId, ConnectionShared, Dispatch, ProtocolViolation, state::ConnectionState},
    error::ConnectionError,
    message::{
        DevEui, Mic, PROTOCOL_VERSION, TransactionId, UpstreamAckMessage, UpstreamMessage,
        UpstreamRejectCode, UpstreamRejectMessage, WireMessage,
    },
    registry::{PendingUpstreams, UpstreamCandidates},
};

/// Read loop dispatch for an upstream stream: only `Upstream` frames are
/// legal inbound.
struct UpstreamDispatch {
    pending: Arc<PendingUpstreams>,
    inbound: mpsc::Sender<UpstreamMessage>,
}

#[async_trait]
impl Dispatch for UpstreamDispatch {
    async fn dispatch(&self, message: WireMessage) -> Result<(), ProtocolViolation> {
        let WireMessage::Upstream(upstream) = message else {
            return Err(ProtocolViolation {
                stream: "upstream",
                kind: message.kind(),
            });
        };
        let candidates = UpstreamCandidates {
            dev_euis: upstream.dev_euis.clone(),
            mic_challenge: upstream.mic_challenge.clone(),
        };
        if !self.pending.insert(upstream.transaction_id, candidates) {
            warn!(
                transaction_id = %upstream.transaction_id,
                "transaction id redelivered while still pending",
            );
        }
        // The buffer is bounded; a slow consumer backpressures the read loop
        // here. A dropped receiver just discards the message.
        let _ = self.inbound.send(upstream).await;
        Ok(())
    }

    fn on_reconnect(&self) {
        let lost = self.pending.drain();
        if lost > 0 {
            warn!(count = lost, "unanswered upstream messages lost across reconnect");
        }
    }

    fn on_closed(&self) {
        // Unanswered obligations are moot once the stream is gone.
        self.pending.drain();
    }
}

/// One upstream stream connection.
///
/// Inbound messages arrive in wire order through [`recv`](Self::recv) or
/// [`stream`](Self::stream). Sibling connections opened from the same
/// manager receive disjoint subsets of the coverage's traffic.
pub struct UpstreamConnection {
    shared: Arc<ConnectionShared>,
    pending: Arc<PendingUpstreams>,
    inbound: Mutex<mpsc::Receiver<UpstreamMessage>>,
}

impl UpstreamConnection {
    pub(crate) fn start(
        shared: Arc<ConnectionShared>,
        source: crate::connection::FrameSource,
        buffer_size: usize,
    ) -> Arc<Self> {
        let pending = Arc::new(PendingUpstreams::default());
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        shared.spawn_run(
            source,
            Arc::new(UpstreamDispatch {
                pending: Arc::clone(&pending),
                inbound: tx,
            }),
        );
        Arc::new(Self {
            shared,
            pending,
            inbound: Mutex::new(rx),
        })
    }

    /// Identifier of this connection.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.shared.id() }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.shared.state() }

    /// Watch lifecycle transitions.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> { self.shared.state_watch() }

    /// Whether the connection has reached its terminal state.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.shared.is_closed() }

    /// Await the next upstream message.
    ///
    /// # Errors
    /// [`ConnectionError::TimedOut`] when the deadline elapses (the
    /// connection stays usable), [`ConnectionError::Closed`] once the stream
    /// has ended gracefully and the buffer is drained, or the terminal
    /// failure after an abnormal close.
    pub async fn recv(&self, timeout: Duration) -> Result<UpstreamMessage, ConnectionError> {
        let mut inbound = self.inbound.lock().await;
        match tokio::time::timeout(timeout, inbound.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(self.shared.terminal_error().unwrap_or(ConnectionError::Closed)),
            Err(_) => Err(ConnectionError::TimedOut),
        }
    }

    /// Lazy sequence of inbound upstream messages in arrival order.
    ///
    /// Ends after draining the buffer on a graceful close; yields one final
    /// `Err` and then ends when the connection failed.
    pub fn stream(&self) -> impl Stream<Item = Result<UpstreamMessage, ConnectionError>> + '_ {
        futures::stream::unfold(false, move |done| async move {
            if done {
                return None;
            }
            let mut inbound = self.inbound.lock().await;
            match inbound.recv().await {
                Some(message) => Some((Ok(message), false)),
                None => self.shared.terminal_error().map(|err| (Err(err), true)),
            }
        })
    }

    /// Confirm an upstream message, naming the resolved device and MIC.
    ///
    /// # Errors
    /// [`ConnectionError::UnknownTransaction`] when the id was never
    /// delivered or was already answered; [`ConnectionError::NotACandidate`]
    /// / [`ConnectionError::ChallengeMismatch`] when the named device or MIC
    /// is not among the message's candidates (the obligation stays pending);
    /// send failures leave the obligation pending for a retry.
    pub async fn acknowledge(
        &self,
        transaction_id: TransactionId,
        dev_eui: DevEui,
        mic: Mic,
    ) -> Result<(), ConnectionError> {
        let candidates = self
            .pending
            .take(transaction_id)
            .ok_or(ConnectionError::UnknownTransaction(transaction_id))?;
        if !candidates.dev_euis.contains(&dev_eui) {
            self.pending.restore(transaction_id, candidates);
            return Err(ConnectionError::NotACandidate {
                transaction_id,
                dev_eui,
            });
        }
        if !candidates.mic_challenge.contains(&mic) {
            self.pending.restore(transaction_id, candidates);
            return Err(ConnectionError::ChallengeMismatch {
                transaction_id,
                mic,
            });
        }
        let message = WireMessage::UpstreamAck(UpstreamAckMessage {
            protocol_version: PROTOCOL_VERSION,
            transaction_id,
            dev_eui,
            mic,
        });
        if let Err(err) = self.shared.send_frame(&message).await {
            self.pending.restore(transaction_id, candidates);
            return Err(err);
        }
        Ok(())
    }

    /// Decline an upstream message.
    ///
    /// # Errors
    /// Same unknown-transaction and send failure modes as
    /// [`acknowledge`](Self::acknowledge); there is no membership check.
    pub async fn reject(
        &self,
        transaction_id: TransactionId,
        result_code: UpstreamRejectCode,
        result_message: Option<String>,
    ) -> Result<(), ConnectionError> {
        let candidates = self
            .pending
            .take(transaction_id)
            .ok_or(ConnectionError::UnknownTransaction(transaction_id))?;
        let message = WireMessage::UpstreamReject(UpstreamRejectMessage {
            protocol_version: PROTOCOL_VERSION,
            transaction_id,
            result_code,
            result_message,
        });
        if let Err(err) = self.shared.send_frame(&message).await {
            self.pending.restore(transaction_id, candidates);
            return Err(err);
        }
        Ok(())
    }

    /// Number of delivered messages still owing an acknowledge or reject.
    #[must_use]
    pub fn pending_acknowledgments(&self) -> usize { self.pending.len() }

    /// Begin teardown. Non-blocking and idempotent.
    pub fn close(&self) { self.shared.close(); }

    /// Await the terminal state.
    ///
    /// # Errors
    /// The recorded abnormal close, when one exists.
    pub async fn wait_closed(&self) -> Result<(), ConnectionError> {
        self.shared.wait_closed().await
    }
}
