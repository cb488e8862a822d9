//! Downstream stream connection: network-to-device submissions and their
//! correlated replies.
//!
//! Each submission registers a transaction with the registry before hitting
//! the wire; the RAN answers with a [`crate::message::DownstreamAckMessage`]
//! naming a mailbox, followed by a terminal
//! [`crate::message::DownstreamResultMessage`]. Replies that
//! match no outstanding transaction are logged and parked in the unmatched
//! buffer rather than failing the connection.

pub mod manager;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, warn};

use crate::{
    connection::{ConnectionId, ConnectionShared, Dispatch, ProtocolViolation, state::ConnectionState},
    correlation::{Correlated, DownstreamReply},
    error::ConnectionError,
    message::{
        DevAddr, DevEui, DownstreamMessage, MulticastAddr, MulticastDownstreamMessage,
        PROTOCOL_VERSION, TransactionId, TransmissionWindow, WireMessage,
    },
    registry::{RegistryError, ReplyError, ReplyHandle, TransactionRegistry},
};

/// Read loop dispatch for a downstream stream: only `DownstreamAck` and
/// `DownstreamResult` frames are legal inbound.
struct DownstreamDispatch {
    registry: Arc<TransactionRegistry<DownstreamReply>>,
    unmatched: mpsc::Sender<DownstreamReply>,
}

#[async_trait]
impl Dispatch for DownstreamDispatch {
    async fn dispatch(&self, message: WireMessage) -> Result<(), ProtocolViolation> {
        let reply = match message {
            WireMessage::DownstreamAck(ack) => DownstreamReply::Ack(ack),
            WireMessage::DownstreamResult(result) => DownstreamReply::Result(result),
            other => {
                return Err(ProtocolViolation {
                    stream: "downstream",
                    kind: other.kind(),
                });
            }
        };
        if !self.registry.resolve(reply.clone()) {
            warn!(
                transaction_id = %reply.transaction_id(),
                "reply matched no outstanding transaction",
            );
            let _ = self.unmatched.send(reply).await;
        }
        Ok(())
    }

    fn on_reconnect(&self) {
        // Outstanding transactions stay registered; if the network never
        // answers on the new transport their waiters resolve by timeout.
        debug!(outstanding = self.registry.len(), "transport replaced");
    }

    fn on_closed(&self) { self.registry.clear(); }
}

/// One downstream stream connection.
pub struct DownstreamConnection {
    shared: Arc<ConnectionShared>,
    registry: Arc<TransactionRegistry<DownstreamReply>>,
    unmatched: Mutex<mpsc::Receiver<DownstreamReply>>,
}

impl DownstreamConnection {
    pub(crate) fn start(
        shared: Arc<ConnectionShared>,
        source: crate::connection::FrameSource,
        buffer_size: usize,
    ) -> Arc<Self> {
        let registry = Arc::new(TransactionRegistry::default());
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        shared.spawn_run(
            source,
            Arc::new(DownstreamDispatch {
                registry: Arc::clone(&registry),
                unmatched: tx,
            }),
        );
        Arc::new(Self {
            shared,
            registry,
            unmatched: Mutex::new(rx),
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

    /// Submit a downstream message to a single device.
    ///
    /// Returns the handle for the correlated replies: an ack first, then the
    /// terminal result.
    ///
    /// # Errors
    /// [`ConnectionError::DuplicateTransaction`] when `transaction_id` is
    /// already outstanding; transport errors leave no entry registered.
    pub async fn send_downstream(
        &self,
        transaction_id: TransactionId,
        dev_eui: DevEui,
        tx_window: TransmissionWindow,
        phy_payload: Vec<u8>,
        target_dev_addr: Option<DevAddr>,
    ) -> Result<ReplyHandle<DownstreamReply>, ConnectionError> {
        let message = WireMessage::Downstream(DownstreamMessage {
            protocol_version: PROTOCOL_VERSION,
            transaction_id,
            dev_eui,
            target_dev_addr,
            tx_window,
            phy_payload,
        });
        self.submit(transaction_id, &message).await
    }

    /// Submit a downstream message to a multicast group.
    ///
    /// # Errors
    /// Same failure modes as [`send_downstream`](Self::send_downstream).
    pub async fn send_multicast_downstream(
        &self,
        transaction_id: TransactionId,
        addr: MulticastAddr,
        tx_window: TransmissionWindow,
        phy_payload: Vec<u8>,
    ) -> Result<ReplyHandle<DownstreamReply>, ConnectionError> {
        let message = WireMessage::MulticastDownstream(MulticastDownstreamMessage {
            protocol_version: PROTOCOL_VERSION,
            transaction_id,
            addr,
            tx_window,
            phy_payload,
        });
        self.submit(transaction_id, &message).await
    }

    async fn submit(
        &self,
        transaction_id: TransactionId,
        message: &WireMessage,
    ) -> Result<ReplyHandle<DownstreamReply>, ConnectionError> {
        let handle = self.registry.register(transaction_id).map_err(|err| match err {
            RegistryError::Duplicate(id) => ConnectionError::DuplicateTransaction(id),
        })?;
        if let Err(err) = self.shared.send_frame(message).await {
            self.registry.expire(transaction_id);
            return Err(err);
        }
        Ok(handle)
    }

    /// Await the next reply for an outstanding transaction.
    ///
    /// # Errors
    /// [`ConnectionError::UnknownTransaction`] when the id is not
    /// outstanding; [`ConnectionError::TimedOut`] when `timeout` elapses, in
    /// which case the transaction is expired and its id becomes reusable.
    pub async fn receive_reply(
        &self,
        transaction_id: TransactionId,
        timeout: Duration,
    ) -> Result<DownstreamReply, ConnectionError> {
        let handle = self
            .registry
            .waiter(transaction_id)
            .ok_or(ConnectionError::UnknownTransaction(transaction_id))?;
        match handle.next(timeout).await {
            Ok(reply) => Ok(reply),
            Err(ReplyError::TimedOut) => {
                self.registry.expire(transaction_id);
                Err(ConnectionError::TimedOut)
            }
            Err(ReplyError::Closed) => {
                Err(self.shared.terminal_error().unwrap_or(ConnectionError::Closed))
            }
        }
    }

    /// Await the next reply that matched no outstanding transaction.
    ///
    /// # Errors
    /// [`ConnectionError::TimedOut`] when the deadline elapses;
    /// [`ConnectionError::Closed`] or the terminal failure once the stream
    /// has ended.
    pub async fn receive(&self, timeout: Duration) -> Result<DownstreamReply, ConnectionError> {
        let mut unmatched = self.unmatched.lock().await;
        match tokio::time::timeout(timeout, unmatched.recv()).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(self.shared.terminal_error().unwrap_or(ConnectionError::Closed)),
            Err(_) => Err(ConnectionError::TimedOut),
        }
    }

    /// Lazy sequence of unmatched inbound replies.
    ///
    /// Ends after draining the buffer on a graceful close; yields one final
    /// `Err` and then ends when the connection failed.
    pub fn stream(&self) -> impl Stream<Item = Result<DownstreamReply, ConnectionError>> + '_ {
        futures::stream::unfold(false, move |done| async move {
            if done {
                return None;
            }
            let mut unmatched = self.unmatched.lock().await;
            match unmatched.recv().await {
                Some(reply) => Some((Ok(reply), false)),
                None => self.shared.terminal_error().map(|err| (Err(err), true)),
            }
        })
    }

    /// Number of transactions awaiting replies.
    #[must_use]
    pub fn outstanding(&self) -> usize { self.registry.len() }

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
