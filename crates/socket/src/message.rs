use serde_json::Value;

use crate::error::SocketError;

/// A payload handed to [`ReconnectingSocket::send_message`](crate::ReconnectingSocket::send_message).
///
/// Text goes out unchanged; JSON values are serialized first.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Json(Value),
}

impl OutboundMessage {
    pub fn into_text(self) -> Result<String, SocketError> {
        match self {
            OutboundMessage::Text(text) => Ok(text),
            OutboundMessage::Json(value) => Ok(serde_json::to_string(&value)?),
        }
    }
}

impl From<String> for OutboundMessage {
    fn from(text: String) -> Self {
        OutboundMessage::Text(text)
    }
}

impl From<&str> for OutboundMessage {
    fn from(text: &str) -> Self {
        OutboundMessage::Text(text.to_string())
    }
}

impl From<Value> for OutboundMessage {
    fn from(value: Value) -> Self {
        OutboundMessage::Json(value)
    }
}

/// Application-level keepalive sent on every heartbeat tick.
pub fn heartbeat_payload() -> String {
    serde_json::json!({ "type": "ping" }).to_string()
}
