//! Self-healing WebSocket client.
//!
//! A [`ReconnectingSocket`] opens its connection on construction and keeps
//! one driver task per connection lifetime. The driver runs the
//! connect -> session -> reconnect loop; the handle owns the reconnect
//! policy flags and a generation counter so a superseded driver can never
//! change state after a manual `disconnect` or `reconnect`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SocketConfig;
use crate::error::SocketError;
use crate::handlers::SocketHandlers;
use crate::message::{heartbeat_payload, OutboundMessage};
use crate::transport::{FrameSink, FrameStream, Transport, TransportFrame, TungsteniteTransport};

/// How long a cancelled session waits for its close frame to flush.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection state as observed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WebSocket client that reconnects on a fixed interval after the
/// connection closes, up to `max_reconnect_attempts` consecutive times,
/// and sends a `{"type":"ping"}` heartbeat while connected.
///
/// Must be created inside a Tokio runtime. Dropping the handle behaves
/// like [`disconnect`](Self::disconnect).
pub struct ReconnectingSocket {
    shared: Arc<Shared>,
}

struct Shared {
    url: String,
    config: SocketConfig,
    handlers: SocketHandlers,
    transport: Arc<dyn Transport>,
    state: watch::Sender<ConnectionState>,
    control: Mutex<Control>,
}

struct Control {
    should_reconnect: bool,
    reconnect_attempts: u32,
    /// Bumped on every disconnect; drivers carry the value they were
    /// spawned with and stop touching state once it no longer matches.
    generation: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    /// Present exactly while a transport is open.
    outbound: Option<mpsc::UnboundedSender<String>>,
}

enum SessionEnd {
    Closed,
    Cancelled,
}

impl ReconnectingSocket {
    /// Connect to `url` over WebSocket. An empty URL leaves the socket
    /// disconnected and never attempts a connection.
    pub fn new(url: impl Into<String>, config: SocketConfig, handlers: SocketHandlers) -> Self {
        Self::with_transport(url, config, handlers, Arc::new(TungsteniteTransport))
    }

    /// Same as [`new`](Self::new) with a custom transport.
    pub fn with_transport(
        url: impl Into<String>,
        config: SocketConfig,
        handlers: SocketHandlers,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            url: url.into(),
            config,
            handlers,
            transport,
            state,
            control: Mutex::new(Control {
                should_reconnect: true,
                reconnect_attempts: 0,
                generation: 0,
                cancel: CancellationToken::new(),
                task: None,
                outbound: None,
            }),
        });

        if shared.url.is_empty() {
            tracing::debug!("No socket URL configured, staying disconnected");
        } else {
            let mut ctl = shared.lock();
            shared.spawn_driver(&mut ctl, None);
        }

        Self { shared }
    }

    /// Send a text or JSON payload on the open connection.
    ///
    /// Returns [`SocketError::NotConnected`] and drops the message when no
    /// connection is open. Nothing is queued for later delivery.
    pub fn send_message(&self, message: impl Into<OutboundMessage>) -> Result<(), SocketError> {
        let text = message.into().into_text()?;
        let ctl = self.shared.lock();
        let Some(outbound) = ctl.outbound.as_ref() else {
            tracing::warn!(url = %self.shared.url, "Socket not connected, dropping message");
            return Err(SocketError::NotConnected);
        };
        outbound.send(text).map_err(|_| SocketError::NotConnected)
    }

    /// Serialize `payload` as JSON and send it.
    pub fn send_json<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), SocketError> {
        let value = serde_json::to_value(payload)?;
        self.send_message(value)
    }

    /// Close the connection and disable automatic reconnection.
    ///
    /// Cancels any pending reconnect timer and zeroes the attempt count.
    /// Calling this on an already disconnected socket fires no callbacks.
    pub fn disconnect(&self) {
        let was_open = {
            let mut ctl = self.shared.lock();
            ctl.should_reconnect = false;
            ctl.reconnect_attempts = 0;
            ctl.generation += 1;
            ctl.cancel.cancel();
            self.shared.set_state(ConnectionState::Disconnected);
            ctl.outbound.take().is_some()
        };

        if was_open {
            tracing::info!(url = %self.shared.url, "Socket disconnected");
            self.shared.handlers.disconnect();
        }
    }

    /// Tear down the current connection and open a fresh one after a
    /// short delay, re-enabling reconnection with a zeroed attempt count.
    pub fn reconnect(&self) {
        self.disconnect();
        if self.shared.url.is_empty() {
            return;
        }

        tracing::info!(url = %self.shared.url, "Manual socket reconnect");
        let mut ctl = self.shared.lock();
        ctl.should_reconnect = true;
        ctl.reconnect_attempts = 0;
        self.shared
            .spawn_driver(&mut ctl, Some(self.shared.config.manual_reconnect_delay));
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Consecutive automatic reconnects since the last successful open,
    /// `disconnect` or `reconnect`.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().reconnect_attempts
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }
}

impl Drop for ReconnectingSocket {
    fn drop(&mut self) {
        self.disconnect();
        // Detach; the driver exits on its own once cancelled.
        drop(self.shared.lock().task.take());
    }
}

impl std::fmt::Debug for ReconnectingSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingSocket")
            .field("url", &self.shared.url)
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

// ---- driver ----

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    /// Set `next` unless the driver for `generation` has been superseded.
    fn transition(&self, generation: u64, next: ConnectionState) -> bool {
        let ctl = self.lock();
        if ctl.generation != generation {
            return false;
        }
        self.set_state(next);
        true
    }

    fn spawn_driver(self: &Arc<Self>, ctl: &mut Control, initial_delay: Option<Duration>) {
        let generation = ctl.generation;
        let cancel = CancellationToken::new();
        ctl.cancel = cancel.clone();

        let shared = Arc::clone(self);
        ctl.task = Some(tokio::spawn(shared.drive(generation, cancel, initial_delay)));
    }

    async fn drive(
        self: Arc<Self>,
        generation: u64,
        cancel: CancellationToken,
        initial_delay: Option<Duration>,
    ) {
        if let Some(delay) = initial_delay {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        loop {
            if !self.transition(generation, ConnectionState::Connecting) {
                return;
            }

            let connection_id = Uuid::new_v4();
            tracing::info!(%connection_id, url = %self.url, "Connecting socket");

            let connected = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.transport.connect(&self.url) => result,
            };

            match connected {
                Ok((frames, sink)) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    {
                        let mut ctl = self.lock();
                        if ctl.generation != generation {
                            return;
                        }
                        ctl.outbound = Some(tx);
                        ctl.reconnect_attempts = 0;
                        self.set_state(ConnectionState::Connected);
                    }

                    tracing::info!(%connection_id, url = %self.url, "Socket connected");
                    self.handlers.connect();

                    let end = self
                        .run_session(generation, connection_id, &cancel, frames, sink, rx)
                        .await;
                    if let SessionEnd::Cancelled = end {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(%connection_id, url = %self.url, error = %e, "Socket connection failed");
                    if !self.transition(generation, ConnectionState::Error) {
                        return;
                    }
                    self.handlers.error(&e);
                }
            }

            let Some(delay) = self.on_close(generation, connection_id) else {
                return;
            };

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Record a close and decide whether to schedule another attempt.
    fn on_close(&self, generation: u64, connection_id: Uuid) -> Option<Duration> {
        let (scheduled, gave_up) = {
            let mut ctl = self.lock();
            if ctl.generation != generation {
                return None;
            }
            ctl.outbound = None;
            self.set_state(ConnectionState::Disconnected);

            if !ctl.should_reconnect {
                (None, false)
            } else if ctl.reconnect_attempts < self.config.max_reconnect_attempts {
                ctl.reconnect_attempts += 1;
                (Some(ctl.reconnect_attempts), false)
            } else {
                (None, true)
            }
        };

        self.handlers.disconnect();

        match scheduled {
            Some(attempt) => {
                tracing::info!(
                    %connection_id,
                    attempt,
                    max_attempts = self.config.max_reconnect_attempts,
                    delay_ms = self.config.reconnect_interval.as_millis() as u64,
                    "Socket closed, scheduling reconnect",
                );
                Some(self.config.reconnect_interval)
            }
            None => {
                if gave_up {
                    tracing::warn!(
                        %connection_id,
                        url = %self.url,
                        max_attempts = self.config.max_reconnect_attempts,
                        "Socket reconnect attempts exhausted",
                    );
                } else {
                    tracing::info!(%connection_id, "Socket closed");
                }
                None
            }
        }
    }

    async fn run_session(
        &self,
        generation: u64,
        connection_id: Uuid,
        cancel: &CancellationToken,
        mut frames: FrameStream,
        mut sink: FrameSink,
        mut outbound: mpsc::UnboundedReceiver<String>,
    ) -> SessionEnd {
        let mut heartbeat = heartbeat_timer(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return close(connection_id, &mut sink).await,
                _ = tick(&mut heartbeat) => {
                    match write(&mut sink, cancel, heartbeat_payload()).await {
                        None => return close(connection_id, &mut sink).await,
                        Some(Ok(())) => tracing::trace!(%connection_id, "Heartbeat sent"),
                        Some(Err(e)) => tracing::warn!(%connection_id, error = %e, "Failed to send heartbeat"),
                    }
                }
                Some(text) = outbound.recv() => {
                    match write(&mut sink, cancel, text).await {
                        None => return close(connection_id, &mut sink).await,
                        Some(Ok(())) => {}
                        Some(Err(e)) => tracing::warn!(%connection_id, error = %e, "Failed to send socket message"),
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(TransportFrame::Text(text))) => self.dispatch(connection_id, &text),
                    Some(Ok(TransportFrame::Close(reason))) => {
                        tracing::info!(%connection_id, reason = reason.as_deref().unwrap_or(""), "Socket closed by peer");
                        return SessionEnd::Closed;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%connection_id, error = %e, "Socket error");
                        if self.transition(generation, ConnectionState::Error) {
                            // Pings only go out while Connected.
                            heartbeat = None;
                            self.handlers.error(&e);
                        }
                    }
                    None => return SessionEnd::Closed,
                },
            }
        }
    }

    fn dispatch(&self, connection_id: Uuid, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => self.handlers.message(value),
            Err(e) => {
                tracing::warn!(%connection_id, error = %e, "Discarding non-JSON socket message");
            }
        }
    }
}

/// A zero period disables the heartbeat. The first tick fires one full
/// period after the connection opens.
fn heartbeat_timer(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

/// Write one frame unless the session is cancelled first. `None` means
/// cancelled.
async fn write(
    sink: &mut FrameSink,
    cancel: &CancellationToken,
    text: String,
) -> Option<Result<(), SocketError>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        result = sink.send(text) => Some(result),
    }
}

async fn close(connection_id: Uuid, sink: &mut FrameSink) -> SessionEnd {
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        tracing::debug!(%connection_id, "Timed out closing socket");
    }
    SessionEnd::Cancelled
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
