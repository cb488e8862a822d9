//! Session hello exchange performed after each transport connect.
//!
//! The first frame on a fresh transport is a client `Hello` naming the stream
//! path, the bearer token, and the protocol version. The network answers with
//! a `HelloReply` before any stream traffic flows; a refusal or a silent peer
//! fails the connect.

use std::{fmt, time::Duration};

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::{
    codec::CodecError,
    connection::transport::BoxedTransport,
    error::ConnectError,
    message::PROTOCOL_VERSION,
};

/// Client half of the hello exchange.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hello {
    /// Protocol version the client speaks.
    #[serde(rename = "ProtocolVersion")]
    pub protocol_version: u32,
    /// Stream path being attached, e.g. `/api/v1.0/upstream`.
    #[serde(rename = "Path")]
    pub path: String,
    /// Opaque bearer credential.
    #[serde(rename = "AccessToken")]
    pub access_token: String,
}

impl Hello {
    pub(crate) fn new(path: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            path: path.into(),
            access_token: access_token.into(),
        }
    }
}

// The token must not leak into logs.
impl fmt::Debug for Hello {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hello")
            .field("protocol_version", &self.protocol_version)
            .field("path", &self.path)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Network half of the hello exchange.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelloReply {
    /// Whether the session was accepted.
    #[serde(rename = "Accepted")]
    pub accepted: bool,
    /// Refusal reason when `accepted` is false.
    #[serde(rename = "Reason", skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
}

/// Run the hello exchange on a freshly framed transport.
///
/// # Errors
/// [`ConnectError::Rejected`] when the network refuses the session,
/// [`ConnectError::HandshakeTimeout`] when no reply arrives within
/// `deadline`, and I/O or codec errors from the exchange itself.
pub(crate) async fn exchange_hello(
    framed: &mut Framed<BoxedTransport, LengthDelimitedCodec>,
    hello: &Hello,
    deadline: Duration,
) -> Result<(), ConnectError> {
    let body = serde_json::to_vec(hello).map_err(CodecError::Serialize)?;
    framed.send(body.into()).await?;

    let Ok(reply_frame) = timeout(deadline, framed.next()).await else {
        return Err(ConnectError::HandshakeTimeout);
    };
    let frame = match reply_frame {
        Some(Ok(frame)) => frame,
        Some(Err(err)) => return Err(ConnectError::Io(err)),
        None => {
            return Err(ConnectError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed during hello exchange",
            )));
        }
    };
    let reply: HelloReply =
        serde_json::from_slice(&frame).map_err(CodecError::Deserialize)?;
    if reply.accepted {
        Ok(())
    } else {
        Err(ConnectError::Rejected(
            reply.reason.unwrap_or_else(|| "unspecified".into()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_the_access_token() {
        let hello = Hello::new("/api/v1.0/upstream", "secret-token");
        let rendered = format!("{hello:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn hello_uses_protocol_spelling() {
        let hello = Hello::new("/api/v1.0/downstream", "t");
        let value = serde_json::to_value(&hello).expect("serialize");
        assert!(value.get("ProtocolVersion").is_some());
        assert!(value.get("Path").is_some());
        assert!(value.get("AccessToken").is_some());
    }

    #[test]
    fn reply_reason_is_optional_on_the_wire() {
        let reply: HelloReply =
            serde_json::from_str(r#"{"Accepted":true}"#).expect("deserialize");
        assert!(reply.accepted);
        assert_eq!(reply.reason, None);
    }
}
