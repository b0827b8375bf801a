//! Transport boundary for socket IO.
//!
//! [`ReconnectingSocket`](crate::ReconnectingSocket) owns connection state
//! and policy; a [`Transport`] only knows how to open a duplex text
//! channel to a URL. Tests swap in an in-memory transport.

use std::future::Future;
use std::pin::Pin;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::error::SocketError;

/// A frame delivered by a transport's read half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    Text(String),
    /// The peer closed the connection, with an optional reason.
    Close(Option<String>),
}

/// Read half. The stream ending is equivalent to a close.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<TransportFrame, SocketError>> + Send>>;

/// Write half, accepting text frames.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = SocketError> + Send>>;

pub type ConnectFuture =
    Pin<Box<dyn Future<Output = Result<(FrameStream, FrameSink), SocketError>> + Send>>;

/// Opens duplex text connections.
pub trait Transport: Send + Sync + 'static {
    fn connect(&self, url: &str) -> ConnectFuture;
}

/// WebSocket transport backed by `tokio-tungstenite`.
///
/// Binary, ping and pong frames are not surfaced (tungstenite answers
/// pings itself). A read error is yielded once and then the stream ends,
/// so the socket sees an error followed by a close.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteTransport;

impl Transport for TungsteniteTransport {
    fn connect(&self, url: &str) -> ConnectFuture {
        let url = url.to_string();
        Box::pin(async move {
            let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
                SocketError::Connection(format!("Failed to connect to {url}: {e}"))
            })?;

            let (write, read) = ws_stream.split();

            let frames = futures::stream::unfold(Some(read), |state| async move {
                let mut read = state?;
                loop {
                    match read.next().await? {
                        Ok(Message::Text(text)) => {
                            return Some((Ok(TransportFrame::Text(text)), Some(read)));
                        }
                        Ok(Message::Close(frame)) => {
                            let reason = frame.map(|f| f.reason.to_string());
                            return Some((Ok(TransportFrame::Close(reason)), None));
                        }
                        Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => {}
                        Ok(Message::Frame(_)) => {}
                        Err(e) => {
                            return Some((Err(SocketError::Transport(e.to_string())), None));
                        }
                    }
                }
            });

            let sink = write
                .with(|text: String| {
                    futures::future::ready(Ok::<_, tungstenite::Error>(Message::Text(text)))
                })
                .sink_map_err(|e| SocketError::Transport(e.to_string()));

            let frames: FrameStream = Box::pin(frames);
            let sink: FrameSink = Box::pin(sink);
            Ok((frames, sink))
        })
    }
}
