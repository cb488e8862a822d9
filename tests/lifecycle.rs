//! Connection lifecycle: handshake outcomes, graceful close semantics, and
//! fatal inbound failures.

mod support;

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use ranlink::{
    ConnectError,
    ConnectionError,
    ConnectionState,
    WireMessage,
    connection::preamble::HelloReply,
    session::UPSTREAM_PATH,
};
use support::{FakePeer, TestConnector, session, upstream_message};

#[tokio::test]
async fn the_hello_names_the_stream_path_and_token() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).upstream();
    let (connection, peer) =
        tokio::join!(manager.create_connection(8), FakePeer::accept(&mut incoming));
    let connection = connection.expect("connection");

    assert_eq!(peer.hello.path, UPSTREAM_PATH);
    assert_eq!(peer.hello.access_token, "integration-token");
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn a_rejected_hello_fails_the_connect() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).upstream();
    let reply = HelloReply {
        accepted: false,
        reason: Some(String::from("bad credentials")),
    };
    let (outcome, _peer) = tokio::join!(
        manager.create_connection(8),
        FakePeer::accept_with(&mut incoming, reply),
    );
    let err = outcome.err().expect("the connect must fail");
    match err {
        ConnectError::Rejected(reason) => assert_eq!(reason, "bad credentials"),
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn close_is_idempotent_and_wait_closed_resolves_after_the_fact() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).upstream();
    let (connection, _peer) =
        tokio::join!(manager.create_connection(8), FakePeer::accept(&mut incoming));
    let connection = connection.expect("connection");

    connection.close();
    connection.close();
    connection.wait_closed().await.expect("graceful close");
    assert!(connection.is_closed());
    // Resolves again without suspending.
    connection.wait_closed().await.expect("still graceful");
}

#[tokio::test]
async fn a_graceful_close_drains_buffered_messages_then_ends_the_stream() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).upstream();
    let (connection, mut peer) =
        tokio::join!(manager.create_connection(8), FakePeer::accept(&mut incoming));
    let connection = connection.expect("connection");

    peer.send(&WireMessage::Upstream(upstream_message(1, &[1], &[1])))
        .await;
    peer.send(&WireMessage::Upstream(upstream_message(2, &[2], &[1])))
        .await;
    // Wait for the read loop to buffer both before tearing down.
    while connection.pending_acknowledgments() < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    connection.close();
    connection.wait_closed().await.expect("graceful close");

    let items: Vec<_> = connection.stream().collect().await;
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(Result::is_ok));
}

#[tokio::test(start_paused = true)]
async fn close_completes_with_a_full_inbound_buffer() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).upstream();
    let (connection, mut peer) =
        tokio::join!(manager.create_connection(1), FakePeer::accept(&mut incoming));
    let connection = connection.expect("connection");

    for id in 1..=3u64 {
        peer.send(&WireMessage::Upstream(upstream_message(id, &[id], &[1])))
            .await;
    }
    // One message fits the buffer; the read loop parks delivering the next.
    while connection.pending_acknowledgments() < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    connection.close();
    tokio::time::timeout(Duration::from_secs(2), connection.wait_closed())
        .await
        .expect("close is not held up by an undrained consumer")
        .expect("graceful close");
}

#[tokio::test(start_paused = true)]
async fn close_completes_behind_a_stalled_writer() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).downstream();
    let (connection, _peer) =
        tokio::join!(manager.create_connection(8), FakePeer::accept(&mut incoming));
    let connection = connection.expect("connection");

    // A frame larger than the transport buffer wedges the writer while the
    // peer reads nothing.
    let submission = {
        let connection = Arc::clone(&connection);
        tokio::spawn(async move {
            connection
                .send_downstream(
                    ranlink::TransactionId(1),
                    ranlink::DevEui(1),
                    support::class_a_window(),
                    vec![0x60; 96 * 1024],
                    None,
                )
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    connection.close();
    tokio::time::timeout(Duration::from_secs(2), connection.wait_closed())
        .await
        .expect("close is not held up by a wedged writer")
        .expect("graceful close");

    let outcome = submission.await.expect("submission task");
    assert!(matches!(outcome, Err(ConnectionError::Closed)));
    assert_eq!(connection.outstanding(), 0, "the failed submission left no entry");
}

#[tokio::test]
async fn sends_on_a_closed_connection_fail() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).downstream();
    let (connection, _peer) =
        tokio::join!(manager.create_connection(8), FakePeer::accept(&mut incoming));
    let connection = connection.expect("connection");

    connection.close();
    connection.wait_closed().await.expect("graceful close");
    assert!(matches!(
        connection
            .send_downstream(
                ranlink::TransactionId(1),
                ranlink::DevEui(1),
                support::class_a_window(),
                vec![0x60],
                None,
            )
            .await,
        Err(ConnectionError::Closed)
    ));
}

#[tokio::test]
async fn peer_eof_without_reconnect_closes_gracefully() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).upstream();
    let (connection, peer) =
        tokio::join!(manager.create_connection(8), FakePeer::accept(&mut incoming));
    let connection = connection.expect("connection");

    peer.drop_transport();
    connection.wait_closed().await.expect("clean end of stream");
}

#[tokio::test]
async fn a_malformed_frame_is_fatal() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).upstream();
    let (connection, mut peer) =
        tokio::join!(manager.create_connection(8), FakePeer::accept(&mut incoming));
    let connection = connection.expect("connection");

    peer.send(&WireMessage::Upstream(upstream_message(1, &[1], &[1])))
        .await;
    peer.send_raw(b"not a json object".to_vec()).await;

    let mut stream = Box::pin(connection.stream());
    let first = stream.next().await.expect("buffered message");
    assert!(first.is_ok());
    let second = stream.next().await.expect("terminal error");
    assert!(matches!(second, Err(ConnectionError::ClosedAbnormally { .. })));
    assert!(stream.next().await.is_none(), "the stream ends after the error");
    drop(stream);
    assert!(connection.wait_closed().await.is_err());
}

#[tokio::test]
async fn close_all_tears_down_every_tracked_connection() {
    let (connector, mut incoming) = TestConnector::new();
    let manager = session(connector).upstream();
    let (first, _first_peer) =
        tokio::join!(manager.create_connection(8), FakePeer::accept(&mut incoming));
    let (second, _second_peer) =
        tokio::join!(manager.create_connection(8), FakePeer::accept(&mut incoming));
    let first = first.expect("first connection");
    let second = second.expect("second connection");
    assert_eq!(manager.active(), 2);

    manager.close_all().await;
    assert!(first.is_closed());
    assert!(second.is_closed());
    assert_eq!(manager.active(), 0);
}
