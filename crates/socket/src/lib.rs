//! Reconnecting WebSocket client for DockerDeployer backend events.
//!
//! [`ReconnectingSocket`] keeps a connection open with a fixed-interval
//! reconnect policy and a periodic heartbeat. IO goes through the
//! [`Transport`] trait; [`TungsteniteTransport`] is the production
//! implementation.

pub mod config;
pub mod error;
pub mod handlers;
pub mod message;
pub mod socket;
pub mod transport;

pub use config::SocketConfig;
pub use error::SocketError;
pub use handlers::SocketHandlers;
pub use message::OutboundMessage;
pub use socket::{ConnectionState, ReconnectingSocket};
pub use transport::{Transport, TransportFrame, TungsteniteTransport};
