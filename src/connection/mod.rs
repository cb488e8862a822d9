//! Shared machinery behind the upstream and downstream stream connections.
//!
//! Each connection owns one transport at a time, framed with a
//! length-delimited codec. The write half lives behind an async mutex so
//! senders contend only on the sink itself; the read half is driven by a
//! single background task that decodes frames and hands them to the stream
//! kind's [`Dispatch`] implementation. The same task supervises
//! reconnection: an unexpected transport loss re-dials through the shared
//! connector on the configured back-off schedule, and only explicit close,
//! fatal decode errors, or schedule exhaustion are terminal.

pub mod preamble;
pub mod state;
pub mod transport;

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::sync::Mutex;
use tokio_util::{
    codec::{Framed, LengthDelimitedCodec},
    sync::CancellationToken,
};
use tracing::{debug, error, warn};

use crate::{
    codec::{CodecConfig, decode_message, encode_message},
    connection::{
        preamble::{Hello, exchange_hello},
        state::{ConnectionState, Lifecycle},
        transport::{BoxedTransport, Connector, Endpoint},
    },
    error::{CloseReason, ConnectError, ConnectionError},
    message::WireMessage,
    metrics,
    reconnect::{Backoff, ReconnectPolicy},
};

pub(crate) type FrameSink = SplitSink<Framed<BoxedTransport, LengthDelimitedCodec>, Bytes>;
pub(crate) type FrameSource = SplitStream<Framed<BoxedTransport, LengthDelimitedCodec>>;

/// How long teardown waits for unflushed output before dropping the
/// transport.
const TEARDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Process-unique identifier for one logical stream connection.
///
/// The identifier survives reconnects; a replacement transport keeps the id
/// of the logical connection it resumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A well-formed message this stream kind must never receive.
#[derive(Debug, thiserror::Error)]
#[error("unexpected {kind} message on a {stream} stream")]
pub(crate) struct ProtocolViolation {
    pub(crate) stream: &'static str,
    pub(crate) kind: &'static str,
}

/// Per-stream-kind inbound handling, called from the read task.
#[async_trait]
pub(crate) trait Dispatch: Send + Sync {
    /// Handle one decoded message. An error is fatal to the connection.
    ///
    /// Delivery into a bounded consumer buffer may suspend here; that is the
    /// backpressure point for inbound traffic.
    async fn dispatch(&self, message: WireMessage) -> Result<(), ProtocolViolation>;

    /// A replacement transport is being dialled; in-flight per-transport
    /// state should be reconciled.
    fn on_reconnect(&self);

    /// The connection reached its terminal state.
    fn on_closed(&self);
}

/// Everything needed to (re)establish a transport for one connection.
pub(crate) struct ConnectSettings {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) endpoint: Endpoint,
    pub(crate) hello: Hello,
    pub(crate) codec: CodecConfig,
    pub(crate) reconnect: ReconnectPolicy,
    pub(crate) handshake_timeout: Duration,
}

impl ConnectSettings {
    async fn open_transport(&self) -> Result<Framed<BoxedTransport, LengthDelimitedCodec>, ConnectError> {
        let transport = self.connector.connect(&self.endpoint).await?;
        let mut framed = Framed::new(transport, self.codec.length_codec());
        exchange_hello(&mut framed, &self.hello, self.handshake_timeout).await?;
        Ok(framed)
    }
}

/// State shared between a connection handle, its read task, and its manager.
pub(crate) struct ConnectionShared {
    id: ConnectionId,
    lifecycle: Lifecycle,
    writer: Mutex<Option<FrameSink>>,
    cancel: CancellationToken,
    settings: ConnectSettings,
}

enum ReadOutcome {
    /// `close()` was requested.
    Cancelled,
    /// EOF (`None`) or an I/O error ended the transport unexpectedly.
    TransportLost(Option<io::Error>),
    /// A malformed or protocol-violating frame; never retried.
    Fatal(CloseReason),
}

enum Reestablish {
    Resumed(FrameSource),
    Cancelled,
    Exhausted { attempts: u32 },
}

impl ConnectionShared {
    /// Dial, shake hands, and install the first transport.
    pub(crate) async fn establish(
        settings: ConnectSettings,
    ) -> Result<(Arc<Self>, FrameSource), ConnectError> {
        let shared = Arc::new(Self {
            id: ConnectionId::next(),
            lifecycle: Lifecycle::new(),
            writer: Mutex::new(None),
            cancel: CancellationToken::new(),
            settings,
        });
        shared.lifecycle.transition(ConnectionState::Connecting);
        let framed = shared.settings.open_transport().await?;
        let (sink, source) = framed.split();
        *shared.writer.lock().await = Some(sink);
        shared.lifecycle.transition(ConnectionState::Connected);
        metrics::inc_connections();
        debug!(id = %shared.id, endpoint = %shared.settings.endpoint.authority, "connection established");
        Ok((shared, source))
    }

    pub(crate) fn id(&self) -> ConnectionId { self.id }

    pub(crate) fn state(&self) -> ConnectionState { self.lifecycle.state() }

    pub(crate) fn state_watch(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.lifecycle.watch()
    }

    pub(crate) fn is_closed(&self) -> bool { self.lifecycle.is_closed() }

    /// The terminal failure, if the connection closed abnormally.
    pub(crate) fn terminal_error(&self) -> Option<ConnectionError> {
        match self.lifecycle.close_reason() {
            None | Some(CloseReason::Graceful) => None,
            Some(reason) => Some(ConnectionError::from_close_reason(reason)),
        }
    }

    /// Encode and write one message on the current transport.
    pub(crate) async fn send_frame(&self, message: &WireMessage) -> Result<(), ConnectionError> {
        match self.lifecycle.state() {
            ConnectionState::Closing | ConnectionState::Closed => {
                return Err(self.terminal_error().unwrap_or(ConnectionError::Closed));
            }
            _ => {}
        }
        let body = encode_message(message)?;
        // Never hold up teardown: both the lock wait and the write itself
        // yield to cancellation, so a peer that stopped reading cannot keep
        // the writer mutex pinned under a blocked flush.
        let mut writer = tokio::select! {
            () = self.cancel.cancelled() => {
                return Err(self.terminal_error().unwrap_or(ConnectionError::Closed));
            }
            guard = self.writer.lock() => guard,
        };
        let Some(sink) = writer.as_mut() else {
            return Err(ConnectionError::NotConnected);
        };
        tokio::select! {
            () = self.cancel.cancelled() => {
                Err(self.terminal_error().unwrap_or(ConnectionError::Closed))
            }
            sent = sink.send(body) => {
                sent?;
                metrics::inc_frames(metrics::Direction::Outbound);
                Ok(())
            }
        }
    }

    /// Request teardown. Non-blocking and idempotent; the read task observes
    /// the cancellation and completes the close.
    pub(crate) fn close(&self) {
        self.lifecycle.begin_close(CloseReason::Graceful);
        self.cancel.cancel();
    }

    /// Await the terminal state.
    ///
    /// # Errors
    /// The recorded abnormal close, when one exists.
    pub(crate) async fn wait_closed(&self) -> Result<(), ConnectionError> {
        self.lifecycle.wait_closed().await
    }

    /// Spawn the read task that drives this connection to completion.
    pub(crate) fn spawn_run(self: &Arc<Self>, source: FrameSource, dispatch: Arc<dyn Dispatch>) {
        let shared = Arc::clone(self);
        tokio::spawn(shared.run(source, dispatch));
    }

    async fn run(self: Arc<Self>, mut source: FrameSource, dispatch: Arc<dyn Dispatch>) {
        let mut backoff = Backoff::new(self.settings.reconnect);
        let reason = loop {
            match self.read_frames(&mut source, dispatch.as_ref()).await {
                ReadOutcome::Cancelled => break CloseReason::Graceful,
                ReadOutcome::Fatal(reason) => {
                    metrics::inc_errors();
                    error!(id = %self.id, "fatal inbound frame, closing connection");
                    break reason;
                }
                ReadOutcome::TransportLost(cause) => {
                    if self.cancel.is_cancelled() {
                        break CloseReason::Graceful;
                    }
                    *self.writer.lock().await = None;
                    if !self.settings.reconnect.enabled {
                        break match cause {
                            None => CloseReason::Graceful,
                            Some(err) => CloseReason::Io(Arc::new(err)),
                        };
                    }
                    self.lifecycle.transition(ConnectionState::Connecting);
                    debug!(id = %self.id, "transport lost, reconnecting");
                    dispatch.on_reconnect();
                    match self.reestablish(&mut backoff).await {
                        Reestablish::Resumed(new_source) => {
                            source = new_source;
                            backoff.reset();
                            self.lifecycle.transition(ConnectionState::Connected);
                            debug!(id = %self.id, "transport re-established");
                        }
                        Reestablish::Cancelled => break CloseReason::Graceful,
                        Reestablish::Exhausted { attempts } => {
                            metrics::inc_errors();
                            break CloseReason::ReconnectExhausted { attempts };
                        }
                    }
                }
            }
        };

        // Cancel before touching the writer: a sender parked on a stalled
        // transport holds the mutex until it observes the token.
        self.cancel.cancel();
        self.lifecycle.finish_close(reason);
        dispatch.on_closed();
        if let Some(mut sink) = self.writer.lock().await.take() {
            if tokio::time::timeout(TEARDOWN_FLUSH_TIMEOUT, sink.close())
                .await
                .is_err()
            {
                debug!(id = %self.id, "transport did not flush on close, dropping");
            }
        }
        metrics::dec_connections();
        debug!(id = %self.id, "connection closed");
        // Dropping `dispatch` here releases the inbound buffers, which is how
        // consumer streams observe the end of the sequence.
    }

    async fn read_frames(&self, source: &mut FrameSource, dispatch: &dyn Dispatch) -> ReadOutcome {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return ReadOutcome::Cancelled,
                frame = source.next() => match frame {
                    None => return ReadOutcome::TransportLost(None),
                    Some(Err(err)) => return ReadOutcome::TransportLost(Some(err)),
                    Some(Ok(body)) => {
                        metrics::inc_frames(metrics::Direction::Inbound);
                        let message = match decode_message(&body) {
                            Ok(message) => message,
                            Err(err) => {
                                return ReadOutcome::Fatal(CloseReason::Codec(Arc::new(err)));
                            }
                        };
                        // Delivery may suspend on a full consumer buffer;
                        // close must still win, and the frame is dropped.
                        let delivered = tokio::select! {
                            () = self.cancel.cancelled() => return ReadOutcome::Cancelled,
                            outcome = dispatch.dispatch(message) => outcome,
                        };
                        if let Err(violation) = delivered {
                            return ReadOutcome::Fatal(CloseReason::Protocol(violation.to_string()));
                        }
                    }
                },
            }
        }
    }

    async fn reestablish(&self, backoff: &mut Backoff) -> Reestablish {
        while let Some(delay) = backoff.next_delay() {
            tokio::select! {
                () = self.cancel.cancelled() => return Reestablish::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
            metrics::inc_reconnects();
            match self.settings.open_transport().await {
                Ok(framed) => {
                    let (sink, source) = framed.split();
                    *self.writer.lock().await = Some(sink);
                    return Reestablish::Resumed(source);
                }
                Err(err) => {
                    warn!(
                        id = %self.id,
                        attempt = backoff.attempts(),
                        error = %err,
                        "reconnect attempt failed",
                    );
                }
            }
        }
        Reestablish::Exhausted {
            attempts: backoff.attempts(),
        }
    }
}
