use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::SocketError;

type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;
type LifecycleHandler = Arc<dyn Fn() + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&SocketError) + Send + Sync>;

/// Optional callbacks invoked by the socket's driver task.
///
/// Handlers run on the driver task and should not block.
#[derive(Clone, Default)]
pub struct SocketHandlers {
    on_message: Option<MessageHandler>,
    on_connect: Option<LifecycleHandler>,
    on_disconnect: Option<LifecycleHandler>,
    on_error: Option<ErrorHandler>,
}

impl SocketHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with each incoming frame that parses as JSON.
    pub fn on_message<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Called whenever the connection closes, including after a failed
    /// connection attempt and on an explicit disconnect of an open socket.
    pub fn on_disconnect<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&SocketError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn message(&self, value: Value) {
        if let Some(f) = &self.on_message {
            f(value);
        }
    }

    pub(crate) fn connect(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }

    pub(crate) fn disconnect(&self) {
        if let Some(f) = &self.on_disconnect {
            f();
        }
    }

    pub(crate) fn error(&self, err: &SocketError) {
        if let Some(f) = &self.on_error {
            f(err);
        }
    }
}

impl fmt::Debug for SocketHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketHandlers")
            .field("on_message", &self.on_message.is_some())
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
