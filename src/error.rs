//! Error types for stream connections and session establishment.

use std::{io, sync::Arc};

use crate::{
    codec::CodecError,
    message::{DevEui, Mic, TransactionId},
};

/// Failures establishing a stream connection, covering the transport connect
/// and the hello exchange.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Transport-level connect failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// Failed to encode or decode a hello frame.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The network refused the session.
    #[error("session rejected: {0}")]
    Rejected(String),
    /// No hello reply arrived within the handshake timeout.
    #[error("hello exchange timed out")]
    HandshakeTimeout,
}

/// Why a connection reached its terminal state.
#[derive(Clone, Debug)]
pub enum CloseReason {
    /// Explicit `close()` or a clean end of stream.
    Graceful,
    /// Transport failure while connected.
    Io(Arc<io::Error>),
    /// Malformed inbound frame.
    Codec(Arc<CodecError>),
    /// A well-formed frame this stream kind must never receive.
    Protocol(String),
    /// The reconnect schedule ran out of attempts.
    ReconnectExhausted {
        /// Connect attempts made before giving up.
        attempts: u32,
    },
}

impl CloseReason {
    /// Whether the connection ended without a recorded failure.
    #[must_use]
    pub fn is_graceful(&self) -> bool { matches!(self, Self::Graceful) }
}

/// Errors emitted by live stream-connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Transport failure while writing or reading.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// Fatal encode or decode failure.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The supervisor is between transports; the send was not attempted.
    #[error("not connected")]
    NotConnected,
    /// The connection closed gracefully.
    #[error("connection closed")]
    Closed,
    /// The connection closed after a recorded failure.
    #[error("connection closed abnormally: {reason}")]
    ClosedAbnormally {
        /// Human-readable terminal failure.
        reason: String,
    },
    /// A receive deadline elapsed; the connection itself is unaffected.
    #[error("timed out")]
    TimedOut,
    /// The transaction id is not outstanding on this connection.
    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionId),
    /// The transaction id is already outstanding on this connection.
    #[error("duplicate transaction {0}")]
    DuplicateTransaction(TransactionId),
    /// The device is not among the upstream message's candidates.
    #[error("device {dev_eui} is not a candidate for transaction {transaction_id}")]
    NotACandidate {
        /// Transaction being acknowledged.
        transaction_id: TransactionId,
        /// Device the caller named.
        dev_eui: DevEui,
    },
    /// The MIC is not among the values offered by the challenge.
    #[error("MIC {mic} was not offered for transaction {transaction_id}")]
    ChallengeMismatch {
        /// Transaction being acknowledged.
        transaction_id: TransactionId,
        /// MIC the caller named.
        mic: Mic,
    },
    /// Reconnection gave up after exhausting its schedule.
    #[error("reconnect exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Connect attempts made before giving up.
        attempts: u32,
    },
}

impl ConnectionError {
    pub(crate) fn from_close_reason(reason: &CloseReason) -> Self {
        match reason {
            CloseReason::Graceful => Self::Closed,
            CloseReason::Io(err) => Self::ClosedAbnormally {
                reason: err.to_string(),
            },
            CloseReason::Codec(err) => Self::ClosedAbnormally {
                reason: err.to_string(),
            },
            CloseReason::Protocol(violation) => Self::ClosedAbnormally {
                reason: violation.clone(),
            },
            CloseReason::ReconnectExhausted { attempts } => {
                Self::ReconnectExhausted { attempts: *attempts }
            }
        }
    }
}
