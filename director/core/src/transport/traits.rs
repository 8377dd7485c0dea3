//! Transport Traits
//!
//! Seams between the resilient client and the channel it drives.
//!
//! A [`Connector`] knows how to open one underlying channel (a WebSocket, an
//! SSE response body, an in-memory pipe). The channel is handed back as a
//! [`Link`]: a pair of queues serviced by the connector's own I/O tasks. The
//! [`TransportClient`](super::TransportClient) never touches sockets directly,
//! which is what lets its reconnect and buffering logic run against the
//! in-memory connector in tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during transport operations
///
/// Every variant is recoverable: the client reacts to all of them by
/// reconnecting with backoff.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the underlying channel failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send a frame
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive a frame
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Frame could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// IO error from underlying transport
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Something that happened on an open link
#[derive(Debug)]
pub enum LinkEvent {
    /// A complete inbound text frame
    Message(String),
    /// The link reported an error; a close follows
    Error(TransportError),
}

/// One open underlying channel
///
/// Dropping `outgoing` asks the connector's writer to close the channel.
/// The channel is closed once `incoming` yields `None`.
#[derive(Debug)]
pub struct Link {
    /// Outbound text frames, consumed by the connector's writer task
    pub outgoing: mpsc::UnboundedSender<String>,
    /// Inbound frames and errors, produced by the connector's reader task
    pub incoming: mpsc::Receiver<LinkEvent>,
}

/// Opens underlying channels on behalf of a [`TransportClient`](super::TransportClient)
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new channel
    ///
    /// Called once per connection attempt, including every reconnect.
    async fn open(&self) -> Result<Link, TransportError>;

    /// Human-readable endpoint, used in log lines
    fn endpoint(&self) -> String;
}

/// A closed set of inbound messages decoded from text frames
///
/// Implementations map a wire tag onto one of their variants. Tags they do not
/// know must decode to an explicit ignored variant (reported through
/// [`WireMessage::is_ignored`]) rather than an error, so that newer peers can
/// add message types without breaking older clients.
pub trait WireMessage: Sized + Send + fmt::Debug + 'static {
    /// Decode one inbound text frame
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SerializationError` for malformed frames.
    fn decode(text: &str) -> Result<Self, TransportError>;

    /// Whether this message is a placeholder for an unknown tag
    fn is_ignored(&self) -> bool {
        false
    }
}

/// Lifecycle and inbound traffic reported by a transport client
#[derive(Debug)]
pub enum ClientEvent<M> {
    /// Channel opened; the outbound buffer has already been flushed
    Opened,
    /// Channel closed or an open attempt failed
    Closed {
        /// Delay before the next automatic attempt; `None` after an
        /// explicit disconnect
        reconnect_in: Option<Duration>,
    },
    /// Non-fatal error reported by the channel
    Error(TransportError),
    /// A decoded inbound message
    Message(M),
}
