//! Correlation seam between the read loop and the transaction registry.
//!
//! `Correlated` abstracts over reply types that carry a transaction
//! identifier, letting the registry route and retire entries without knowing
//! the concrete reply representation.

use crate::message::{DownstreamAckMessage, DownstreamResultMessage, TransactionId};

/// Access the correlation properties of a reply message.
pub trait Correlated {
    /// Transaction identifier the reply refers to.
    fn transaction_id(&self) -> TransactionId;

    /// Whether this reply completes its transaction.
    ///
    /// A terminal reply retires the registry entry; non-terminal replies
    /// leave it in place for the follow-up.
    fn is_terminal(&self) -> bool;
}

/// Replies delivered on the downstream stream: first an ack, then a terminal
/// result for the same transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownstreamReply {
    /// The submission was accepted and assigned a mailbox.
    Ack(DownstreamAckMessage),
    /// Terminal transmission status.
    Result(DownstreamResultMessage),
}

impl DownstreamReply {
    /// Mailbox identifier carried by either reply form.
    #[must_use]
    pub fn mailbox_id(&self) -> u64 {
        match self {
            Self::Ack(ack) => ack.mailbox_id,
            Self::Result(result) => result.mailbox_id,
        }
    }
}

impl Correlated for DownstreamReply {
    fn transaction_id(&self) -> TransactionId {
        match self {
            Self::Ack(ack) => ack.transaction_id,
            Self::Result(result) => result.transaction_id,
        }
    }

    fn is_terminal(&self) -> bool { matches!(self, Self::Result(_)) }
}
