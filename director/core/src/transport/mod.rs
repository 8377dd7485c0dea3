//! Transport Layer
//!
//! Resilient message channels for the event feed, the device link and the
//! overlay push channel.
//!
//! - [`TransportClient`]: reconnecting, buffering client driven by a [`Connector`]
//! - [`in_memory`]: channel-backed connector for embedding and tests
//! - [`sse`]: receive-only Server-Sent-Events connector
//! - [`websocket`]: WebSocket connector (feature `websocket`)
//! - [`Envelope`]: the `{type, body}` frame shared by the feed and the overlay

pub mod client;
pub mod config;
pub mod envelope;
pub mod in_memory;
pub mod retry;
pub mod sse;
pub mod traits;
#[cfg(feature = "websocket")]
pub mod websocket;

// Re-exports for convenience
pub use client::{ConnectionState, OutboundBuffer, TransportClient};
pub use config::TransportOptions;
pub use envelope::Envelope;
pub use in_memory::{InMemoryConnector, InMemoryPeer};
pub use retry::RetryState;
pub use sse::{SseConnector, SseDecoder, SseEvent};
pub use traits::{ClientEvent, Connector, Link, LinkEvent, TransportError, WireMessage};

#[cfg(feature = "websocket")]
pub use websocket::WsConnector;
