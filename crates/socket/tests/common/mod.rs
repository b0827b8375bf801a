//! In-memory transport for driving `ReconnectingSocket` in tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use deployer_socket::transport::{ConnectFuture, FrameSink, FrameStream};
use deployer_socket::{
    ConnectionState, ReconnectingSocket, SocketConfig, SocketError, SocketHandlers, Transport,
    TransportFrame,
};
use futures::channel::mpsc as fmpsc;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::mpsc;

pub const URL: &str = "ws://deployer.test/ws";

/// The server side of one accepted connection.
pub struct MockPeer {
    inbound: fmpsc::UnboundedSender<Result<TransportFrame, SocketError>>,
    outbound: fmpsc::UnboundedReceiver<String>,
}

impl MockPeer {
    pub fn send_text(&self, text: &str) {
        let _ = self
            .inbound
            .unbounded_send(Ok(TransportFrame::Text(text.to_string())));
    }

    pub fn send_error(&self, message: &str) {
        let _ = self
            .inbound
            .unbounded_send(Err(SocketError::Transport(message.to_string())));
    }

    pub fn close(&self, reason: &str) {
        let _ = self
            .inbound
            .unbounded_send(Ok(TransportFrame::Close(Some(reason.to_string()))));
    }

    /// Next text frame the client wrote, or `None` once the client closed.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.outbound.next().await
    }

    /// A frame already written by the client, without waiting.
    pub fn try_sent(&mut self) -> Option<String> {
        self.outbound.next().now_or_never().flatten()
    }
}

/// Transport that hands every accepted connection to the test as a
/// [`MockPeer`], or refuses connections while `refuse` is set.
pub struct MockTransport {
    connects: AtomicUsize,
    refuse: AtomicBool,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            connects: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
            peers,
        });
        (transport, rx)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    fn connect(&self, _url: &str) -> ConnectFuture {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if self.refuse.load(Ordering::SeqCst) {
            return Box::pin(async { Err(SocketError::Connection("connection refused".into())) });
        }

        let (inbound_tx, inbound_rx) = fmpsc::unbounded();
        let (outbound_tx, outbound_rx) = fmpsc::unbounded::<String>();
        let _ = self.peers.send(MockPeer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        });

        let frames: FrameStream = Box::pin(inbound_rx);
        let sink: FrameSink =
            Box::pin(outbound_tx.sink_map_err(|e| SocketError::Transport(e.to_string())));
        Box::pin(async move { Ok((frames, sink)) })
    }
}

/// Transport whose connections accept the connect but never finish a
/// write. `live` is held by each open sink, so its strong count shows
/// whether the client has released the connection.
pub struct StalledTransport {
    pub live: Arc<()>,
}

impl Transport for StalledTransport {
    fn connect(&self, _url: &str) -> ConnectFuture {
        let guard = Arc::clone(&self.live);
        let frames: FrameStream =
            Box::pin(futures::stream::pending::<Result<TransportFrame, SocketError>>());
        let sink: FrameSink = Box::pin(futures::sink::unfold(
            guard,
            |guard, _text: String| async move {
                futures::future::pending::<()>().await;
                Ok::<_, SocketError>(guard)
            },
        ));
        Box::pin(async move { Ok((frames, sink)) })
    }
}

/// Counts handler invocations and records received messages.
#[derive(Default)]
pub struct Recorder {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub errors: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<serde_json::Value>>,
}

impl Recorder {
    pub fn handlers(self: &Arc<Self>) -> SocketHandlers {
        let on_message = Arc::clone(self);
        let on_connect = Arc::clone(self);
        let on_disconnect = Arc::clone(self);
        let on_error = Arc::clone(self);
        SocketHandlers::new()
            .on_message(move |value| on_message.messages.lock().unwrap().push(value))
            .on_connect(move || {
                on_connect.connects.fetch_add(1, Ordering::SeqCst);
            })
            .on_disconnect(move || {
                on_disconnect.disconnects.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |e| on_error.errors.lock().unwrap().push(e.to_string()))
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.messages.lock().unwrap().clone()
    }
}

pub fn socket_with(
    config: SocketConfig,
) -> (
    ReconnectingSocket,
    Arc<MockTransport>,
    mpsc::UnboundedReceiver<MockPeer>,
    Arc<Recorder>,
) {
    let (transport, peers) = MockTransport::new();
    let recorder = Arc::new(Recorder::default());
    let socket = ReconnectingSocket::with_transport(
        URL,
        config,
        recorder.handlers(),
        transport.clone(),
    );
    (socket, transport, peers, recorder)
}

pub async fn wait_for_state(socket: &ReconnectingSocket, expected: ConnectionState) {
    let mut rx = socket.subscribe_state();
    rx.wait_for(|state| *state == expected)
        .await
        .expect("state channel closed");
}
