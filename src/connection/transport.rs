//! Pluggable transport layer beneath the framed codec.
//!
//! Production traffic flows over TCP via [`TcpConnector`]; tests inject an
//! in-memory duplex connector through the same [`Connector`] seam.

use std::io;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

/// A bidirectional byte stream suitable for length-delimited framing.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Owned transport handed from a connector to the framing layer.
pub type BoxedTransport = Box<dyn Transport>;

/// Where a stream connection attaches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// `host:port` authority the connector dials.
    pub authority: String,
    /// Stream path announced in the hello frame, e.g. `/api/v1.0/upstream`.
    pub path: String,
}

impl Endpoint {
    /// Build an endpoint from an authority and a stream path.
    #[must_use]
    pub fn new(authority: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            path: path.into(),
        }
    }
}

/// Opens transports toward an [`Endpoint`].
///
/// Implementations must be safe to call concurrently; the managers open
/// several connections over one connector.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a fresh transport.
    ///
    /// # Errors
    /// Any transport-level connect failure.
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<BoxedTransport>;
}

/// Plain TCP connector used outside tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<BoxedTransport> {
        let stream = TcpStream::connect(&endpoint.authority).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}
