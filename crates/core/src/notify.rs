//! User-facing notification sinks.
//!
//! [`Notifier`] is the fire-and-forget collaborator that operations use
//! to report their terminal outcome. Two sinks ship with the crate:
//!
//! - [`TracingNotifier`]: writes notifications to the log.
//! - [`NotificationCenter`]: fans notifications out to any number of
//!   subscribers over a `tokio::sync::broadcast` channel.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::Timestamp;

/// Sink for success and error notifications. Return values are never
/// consumed.
pub trait Notifier: Send + Sync {
    fn notify_success(&self, message: &str);

    fn notify_error(&self, message: &str);
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// A single notification as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    /// When the notification was raised (UTC).
    pub timestamp: Timestamp,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// TracingNotifier
// ---------------------------------------------------------------------------

/// Logs notifications instead of displaying them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify_success(&self, message: &str) {
        tracing::info!(notification = %message, "Operation succeeded");
    }

    fn notify_error(&self, message: &str) {
        tracing::warn!(notification = %message, "Operation failed");
    }
}

// ---------------------------------------------------------------------------
// NotificationCenter
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 64;

/// In-process fan-out of [`Notification`]s.
///
/// Intended to be shared as `Arc<NotificationCenter>`; UI layers
/// subscribe and render each notification as a toast.
pub struct NotificationCenter {
    sender: broadcast::Sender<Notification>,
}

impl NotificationCenter {
    /// Create a center with a specific channel capacity.
    ///
    /// Slow receivers observe `RecvError::Lagged` once the buffer fills.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped when nobody listens.
    pub fn publish(&self, notification: Notification) {
        let _ = self.sender.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Notifier for NotificationCenter {
    fn notify_success(&self, message: &str) {
        self.publish(Notification::new(NotificationLevel::Success, message));
    }

    fn notify_error(&self, message: &str) {
        self.publish(Notification::new(NotificationLevel::Error, message));
    }
}
