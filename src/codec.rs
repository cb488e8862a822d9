//! JSON wire codec for stream protocol frames.
//!
//! Each transport frame is length-delimited and carries exactly one JSON
//! message body. Decoding validates the mandatory-field invariants of the
//! variant; a validation failure is indistinguishable from a malformed frame
//! at the connection level and both are fatal to the connection that received
//! them.

use bytes::Bytes;
use tokio_util::codec::LengthDelimitedCodec;

use crate::message::{DomainError, WireMessage};

/// Default maximum frame length accepted from the transport (1 MiB).
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// Errors produced while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Failed to serialize an outbound message.
    #[error("failed to serialize message")]
    Serialize(#[source] serde_json::Error),
    /// Failed to deserialize an inbound frame.
    #[error("failed to deserialize frame")]
    Deserialize(#[source] serde_json::Error),
    /// The frame decoded but violates a protocol invariant.
    #[error("invalid message: {0}")]
    Validation(#[from] DomainError),
}

/// Framing configuration applied to each stream connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    /// Maximum accepted frame length in bytes.
    pub max_frame_length: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl CodecConfig {
    /// Build the length-delimited framer for this configuration.
    #[must_use]
    pub(crate) fn length_codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .max_frame_length(self.max_frame_length)
            .new_codec()
    }
}

/// Encode a message into a frame body.
///
/// # Errors
/// Returns [`CodecError::Serialize`] when JSON serialization fails.
pub fn encode_message(message: &WireMessage) -> Result<Bytes, CodecError> {
    let body = serde_json::to_vec(message).map_err(CodecError::Serialize)?;
    Ok(Bytes::from(body))
}

/// Decode and validate a frame body.
///
/// Unknown fields are ignored; an unknown `MessageType` or a mandatory-field
/// violation is an error, fatal to the receiving connection.
///
/// # Errors
/// Returns [`CodecError::Deserialize`] for malformed JSON or an unknown
/// discriminator and [`CodecError::Validation`] for invariant violations.
pub fn decode_message(body: &[u8]) -> Result<WireMessage, CodecError> {
    let message: WireMessage = serde_json::from_slice(body).map_err(CodecError::Deserialize)?;
    message.validate()?;
    Ok(message)
}
