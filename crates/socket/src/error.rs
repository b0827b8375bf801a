/// Errors surfaced by the socket and its transports.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A read or write failed on an established connection.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The message was dropped because no connection is open.
    #[error("Not connected")]
    NotConnected,

    /// The payload could not be serialized to JSON.
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}
