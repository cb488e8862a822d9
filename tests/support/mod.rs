//! Shared helpers for the integration suites: an in-memory transport behind
//! the `Connector` seam and a scripted peer that speaks the framed protocol.

#![allow(dead_code)]

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use ranlink::{
    BoxedTransport,
    Connector,
    DevEui,
    Endpoint,
    Mic,
    Modulation,
    PROTOCOL_VERSION,
    ReconnectPolicy,
    StreamSession,
    TransactionId,
    TransmissionWindow,
    TxTiming,
    UpstreamMessage,
    UpstreamRadio,
    WireMessage,
    connection::preamble::{Hello, HelloReply},
    decode_message,
    encode_message,
    message::DownstreamRadio,
};
use tokio::{
    io::DuplexStream,
    sync::mpsc,
};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Hands one end of an in-memory pipe to the client per connect and queues
/// the other end for a [`FakePeer`].
pub struct TestConnector {
    server_ends: mpsc::UnboundedSender<DuplexStream>,
    fail_connects: AtomicUsize,
}

impl TestConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                server_ends: tx,
                fail_connects: AtomicUsize::new(0),
            }),
            rx,
        )
    }

    /// Make the next `n` connect attempts fail with `ConnectionRefused`.
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(&self, _endpoint: &Endpoint) -> io::Result<BoxedTransport> {
        let remaining = self.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "scripted refusal"));
        }
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.server_ends
            .send(server)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "peer gone"))?;
        Ok(Box::new(client))
    }
}

/// Scripted network side of one transport.
pub struct FakePeer {
    framed: Framed<DuplexStream, LengthDelimitedCodec>,
    /// Hello the client presented when attaching.
    pub hello: Hello,
}

impl FakePeer {
    /// Take the next queued transport, read the client hello, and accept it.
    pub async fn accept(incoming: &mut mpsc::UnboundedReceiver<DuplexStream>) -> Self {
        Self::accept_with(incoming, HelloReply {
            accepted: true,
            reason: None,
        })
        .await
    }

    /// Take the next queued transport and answer the hello with `reply`.
    pub async fn accept_with(
        incoming: &mut mpsc::UnboundedReceiver<DuplexStream>,
        reply: HelloReply,
    ) -> Self {
        let stream = incoming.recv().await.expect("a connect attempt");
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
        let frame = framed
            .next()
            .await
            .expect("a hello frame")
            .expect("readable hello frame");
        let hello: Hello = serde_json::from_slice(&frame).expect("well-formed hello");
        let body = serde_json::to_vec(&reply).expect("serializable reply");
        framed.send(body.into()).await.expect("reply written");
        Self { framed, hello }
    }

    /// Send one protocol message to the client.
    pub async fn send(&mut self, message: &WireMessage) {
        let body = encode_message(message).expect("encodable message");
        self.framed.send(body).await.expect("frame written");
    }

    /// Send an arbitrary frame body, bypassing the codec.
    pub async fn send_raw(&mut self, body: Vec<u8>) {
        self.framed.send(body.into()).await.expect("frame written");
    }

    /// Receive and decode the client's next message.
    pub async fn recv(&mut self) -> WireMessage {
        let frame = self
            .framed
            .next()
            .await
            .expect("a frame from the client")
            .expect("readable frame");
        decode_message(&frame).expect("decodable message")
    }

    /// Sever the transport without any protocol-level goodbye.
    pub fn drop_transport(self) { drop(self.framed); }
}

/// Session wired to a [`TestConnector`], reconnect disabled.
pub fn session(connector: Arc<TestConnector>) -> StreamSession {
    session_with_policy(connector, ReconnectPolicy::disabled())
}

/// Session wired to a [`TestConnector`] with an explicit reconnect policy.
pub fn session_with_policy(
    connector: Arc<TestConnector>,
    reconnect: ReconnectPolicy,
) -> StreamSession {
    StreamSession::builder()
        .access_token("integration-token")
        .coverage("test")
        .connector(connector)
        .reconnect(reconnect)
        .build()
        .expect("complete session configuration")
}

/// An upstream message offering the given candidate devices and MIC values.
pub fn upstream_message(id: u64, dev_euis: &[u64], mics: &[u32]) -> UpstreamMessage {
    UpstreamMessage {
        protocol_version: PROTOCOL_VERSION,
        transaction_id: TransactionId(id),
        outdated: None,
        dev_euis: dev_euis.iter().copied().map(DevEui).collect(),
        radio: UpstreamRadio {
            frequency: 868_300_000,
            modulation: Modulation::lora(9, 125_000).expect("valid spreading"),
            rssi: -107.0,
            snr: 7.25,
        },
        phy_payload_no_mic: vec![0x40, 0x11, 0x22, 0x33, 0x44, 0x80, 0x01, 0x00],
        mic_challenge: mics.iter().copied().map(Mic).collect(),
        gps: None,
    }
}

/// A class A transmission window on a LoRa radio.
pub fn class_a_window() -> TransmissionWindow {
    TransmissionWindow {
        radio: DownstreamRadio {
            frequency: 869_525_000,
            modulation: Modulation::lora(9, 125_000).expect("valid spreading"),
        },
        timing: TxTiming::delay(1).expect("valid delay"),
    }
}
