//! Behavioral tests for `ReconnectingSocket` over an in-memory transport.
//!
//! Time is paused, so reconnect intervals and heartbeats elapse as soon as
//! the runtime is otherwise idle.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use deployer_socket::{ConnectionState, SocketConfig, SocketError};
use serde_json::json;
use tokio::time::Instant;

use common::{socket_with, wait_for_state, URL};

/// Let the driver task drain whatever is queued.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ---------------------------------------------------------------------------
// Test: open transitions to connected and fires on_connect
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn connects_on_construction() {
    let (socket, transport, mut peers, recorder) = socket_with(SocketConfig::default());

    let _peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    assert!(socket.is_connected());
    assert_eq!(socket.url(), URL);
    assert_eq!(socket.reconnect_attempts(), 0);
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(recorder.connects(), 1);
    assert_eq!(recorder.disconnects(), 0);
}

// ---------------------------------------------------------------------------
// Test: empty URL never connects
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn empty_url_never_connects() {
    let (transport, _peers) = common::MockTransport::new();
    let socket = deployer_socket::ReconnectingSocket::with_transport(
        "",
        SocketConfig::default(),
        Default::default(),
        transport.clone(),
    );

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connect_count(), 0);
    assert_eq!(socket.state(), ConnectionState::Disconnected);

    socket.reconnect();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.connect_count(), 0);

    assert_matches!(socket.send_message("hello"), Err(SocketError::NotConnected));
}

// ---------------------------------------------------------------------------
// Test: incoming JSON is delivered, non-JSON is discarded
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn incoming_json_reaches_on_message() {
    let (socket, _transport, mut peers, recorder) = socket_with(SocketConfig::default());
    let peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    peer.send_text("not json");
    peer.send_text(r#"{"type":"container_update","id":"abc123","status":"running"}"#);
    settle().await;

    let messages = recorder.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "container_update");
    assert_eq!(messages[0]["status"], "running");
    assert_eq!(socket.state(), ConnectionState::Connected);
    assert_eq!(recorder.error_count(), 0);
}

// ---------------------------------------------------------------------------
// Test: outgoing text passes through, JSON is serialized
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn send_message_writes_to_transport() {
    let (socket, _transport, mut peers, _recorder) = socket_with(SocketConfig::default());
    let mut peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    socket.send_message("raw text").unwrap();
    assert_eq!(peer.next_sent().await.unwrap(), "raw text");

    socket
        .send_message(json!({ "type": "subscribe", "topic": "containers" }))
        .unwrap();
    let sent: serde_json::Value = serde_json::from_str(&peer.next_sent().await.unwrap()).unwrap();
    assert_eq!(sent, json!({ "type": "subscribe", "topic": "containers" }));

    #[derive(serde::Serialize)]
    struct Subscribe<'a> {
        r#type: &'a str,
        container_id: &'a str,
    }
    socket
        .send_json(&Subscribe {
            r#type: "logs",
            container_id: "abc123",
        })
        .unwrap();
    let sent: serde_json::Value = serde_json::from_str(&peer.next_sent().await.unwrap()).unwrap();
    assert_eq!(sent["container_id"], "abc123");
}

// ---------------------------------------------------------------------------
// Test: sends while disconnected are dropped and reported
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn send_while_disconnected_is_dropped() {
    let (socket, _transport, mut peers, _recorder) = socket_with(SocketConfig::default());
    let mut peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    socket.disconnect();
    assert_matches!(socket.send_message("late"), Err(SocketError::NotConnected));

    // The client closed its side without writing the dropped message.
    assert_eq!(peer.next_sent().await, None);
}

// ---------------------------------------------------------------------------
// Test: heartbeat ping after one interval
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn heartbeat_sends_ping_every_interval() {
    let (socket, _transport, mut peers, _recorder) = socket_with(SocketConfig::default());
    let mut peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    let start = Instant::now();
    let first = peer.next_sent().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(30));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&first).unwrap(),
        json!({ "type": "ping" })
    );

    let second = peer.next_sent().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(60));
    assert_eq!(second, first);
}

// ---------------------------------------------------------------------------
// Test: heartbeat stops once the connection leaves Connected
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn heartbeat_stops_after_error() {
    let (socket, _transport, mut peers, _recorder) = socket_with(SocketConfig::default());
    let mut peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    peer.send_error("boom");
    wait_for_state(&socket, ConnectionState::Error).await;

    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(socket.state(), ConnectionState::Error);
    assert_eq!(peer.try_sent(), None);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_stops_after_close() {
    let config = SocketConfig {
        max_reconnect_attempts: 0,
        ..SocketConfig::default()
    };
    let (socket, transport, mut peers, _recorder) = socket_with(config);
    let mut peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    peer.close("going away");
    wait_for_state(&socket, ConnectionState::Disconnected).await;
    tokio::time::sleep(Duration::from_secs(95)).await;

    // The client released its write half without sending a ping.
    assert_eq!(peer.next_sent().await, None);
    assert_eq!(transport.connect_count(), 1);
}

// ---------------------------------------------------------------------------
// Test: disconnect is not held up by a stalled write
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_releases_stalled_connection() {
    let transport = std::sync::Arc::new(common::StalledTransport {
        live: std::sync::Arc::new(()),
    });
    let socket = deployer_socket::ReconnectingSocket::with_transport(
        URL,
        SocketConfig::default(),
        Default::default(),
        transport.clone(),
    );
    wait_for_state(&socket, ConnectionState::Connected).await;
    assert_eq!(std::sync::Arc::strong_count(&transport.live), 2);

    socket.send_message("stuck").unwrap();
    settle().await;

    socket.disconnect();
    // Close gives up after its timeout; the connection is released either way.
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(std::sync::Arc::strong_count(&transport.live), 1);
}

// ---------------------------------------------------------------------------
// Test: close schedules a reconnect after the interval
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn close_schedules_reconnect() {
    let (socket, transport, mut peers, recorder) = socket_with(SocketConfig::default());
    let peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    let start = Instant::now();
    peer.close("server restarting");
    wait_for_state(&socket, ConnectionState::Disconnected).await;

    assert_eq!(socket.reconnect_attempts(), 1);
    assert_eq!(recorder.disconnects(), 1);
    assert_eq!(transport.connect_count(), 1);

    let _peer = peers.recv().await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(3000));
    wait_for_state(&socket, ConnectionState::Connected).await;

    assert_eq!(transport.connect_count(), 2);
    assert_eq!(socket.reconnect_attempts(), 0);
    assert_eq!(recorder.connects(), 2);
}

// ---------------------------------------------------------------------------
// Test: disconnect cancels a pending reconnect
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let (socket, transport, mut peers, recorder) = socket_with(SocketConfig::default());
    let peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    drop(peer);
    wait_for_state(&socket, ConnectionState::Disconnected).await;
    assert_eq!(socket.reconnect_attempts(), 1);

    socket.disconnect();
    assert_eq!(socket.reconnect_attempts(), 0);
    socket.disconnect();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert_eq!(socket.reconnect_attempts(), 0);
    assert_eq!(recorder.disconnects(), 1);
}

// ---------------------------------------------------------------------------
// Test: explicit disconnect of an open socket fires on_disconnect once
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn disconnect_open_socket_does_not_reconnect() {
    let (socket, transport, mut peers, recorder) = socket_with(SocketConfig::default());
    let _peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    socket.disconnect();
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.disconnects(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.connect_count(), 1);
    assert_eq!(recorder.disconnects(), 1);
}

// ---------------------------------------------------------------------------
// Test: transport error sets error state and calls on_error
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transport_error_sets_error_state() {
    let (socket, _transport, mut peers, recorder) = socket_with(SocketConfig::default());
    let peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    peer.send_error("connection reset");
    wait_for_state(&socket, ConnectionState::Error).await;

    assert_eq!(recorder.error_count(), 1);
    assert!(recorder.errors.lock().unwrap()[0].contains("connection reset"));
}

// ---------------------------------------------------------------------------
// Test: refused connections stop after the attempt limit
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let (transport, mut peers) = common::MockTransport::new();
    transport.refuse_connections(true);
    let recorder = std::sync::Arc::new(common::Recorder::default());
    let config = SocketConfig {
        max_reconnect_attempts: 2,
        ..SocketConfig::default()
    };
    let socket = deployer_socket::ReconnectingSocket::with_transport(
        URL,
        config,
        recorder.handlers(),
        transport.clone(),
    );

    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(transport.connect_count(), 3);
    assert_eq!(socket.reconnect_attempts(), 2);
    assert_eq!(socket.state(), ConnectionState::Disconnected);
    assert_eq!(recorder.error_count(), 3);
    assert_eq!(recorder.disconnects(), 3);
    assert_eq!(recorder.connects(), 0);

    // A manual reconnect re-arms the policy.
    transport.refuse_connections(false);
    socket.reconnect();
    let _peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;
    assert_eq!(transport.connect_count(), 4);
    assert_eq!(socket.reconnect_attempts(), 0);
}

// ---------------------------------------------------------------------------
// Test: manual reconnect replaces the live connection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn manual_reconnect_opens_fresh_connection() {
    let (socket, transport, mut peers, recorder) = socket_with(SocketConfig::default());
    let mut first = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    let start = Instant::now();
    socket.reconnect();
    assert_eq!(recorder.disconnects(), 1);

    let _second = peers.recv().await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));
    wait_for_state(&socket, ConnectionState::Connected).await;

    // The old connection was closed by the client and has no further effect.
    assert_eq!(first.next_sent().await, None);
    settle().await;
    assert_eq!(socket.state(), ConnectionState::Connected);
    assert_eq!(transport.connect_count(), 2);
    assert_eq!(recorder.connects(), 2);
}

// ---------------------------------------------------------------------------
// Test: dropping the handle stops all activity
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn drop_stops_reconnecting() {
    let (socket, transport, mut peers, recorder) = socket_with(SocketConfig::default());
    let peer = peers.recv().await.unwrap();
    wait_for_state(&socket, ConnectionState::Connected).await;

    drop(socket);
    drop(peer);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(transport.connect_count(), 1);
    assert_eq!(recorder.disconnects(), 1);
}
