#![doc(html_root_url = "https://docs.rs/ranlink/latest")]
//! Public API for the `ranlink` library.
//!
//! This crate provides a streaming client for LoRaWAN RAN routing: duplex
//! upstream and downstream message streams over length-delimited framed
//! transports, transaction correlation, the MIC-challenge acknowledgment
//! protocol, and supervised reconnection.

pub mod codec;
pub mod connection;
pub mod correlation;
pub mod downstream;
pub mod error;
pub mod message;
pub mod metrics;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod upstream;

pub use codec::{CodecConfig, CodecError, DEFAULT_MAX_FRAME_LENGTH, decode_message, encode_message};
pub use connection::{
    ConnectionId,
    state::ConnectionState,
    transport::{BoxedTransport, Connector, Endpoint, TcpConnector, Transport},
};
pub use correlation::{Correlated, DownstreamReply};
pub use downstream::{DownstreamConnection, manager::DownstreamConnectionManager};
pub use error::{CloseReason, ConnectError, ConnectionError};
pub use message::{
    DevAddr,
    DevEui,
    DomainError,
    DownstreamAckMessage,
    DownstreamMessage,
    DownstreamRadio,
    DownstreamResultCode,
    DownstreamResultMessage,
    Gps,
    MAX_DEADLINE_SECONDS,
    MAX_TMMS_SLOTS,
    Mic,
    Modulation,
    MulticastAddr,
    MulticastDownstreamMessage,
    PROTOCOL_VERSION,
    TransactionId,
    TransmissionWindow,
    TxTiming,
    UpstreamAckMessage,
    UpstreamMessage,
    UpstreamRadio,
    UpstreamRejectCode,
    UpstreamRejectMessage,
    WireMessage,
};
pub use reconnect::ReconnectPolicy;
pub use registry::{
    PendingUpstreams,
    RegistryError,
    ReplyError,
    ReplyHandle,
    TransactionRegistry,
    UpstreamCandidates,
};
pub use session::{
    DOWNSTREAM_PATH,
    SessionBuildError,
    StreamSession,
    StreamSessionBuilder,
    UPSTREAM_PATH,
};
pub use upstream::{UpstreamConnection, manager::UpstreamConnectionManager};
