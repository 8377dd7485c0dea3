//! Snapshot Relay
//!
//! Pushes every evaluated snapshot downstream (e.g. to a stream overlay) as
//! `{ "type": <tag>, "body": [events...] }`. The payload is sent sticky, so
//! a consumer that reconnects immediately receives the current state.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::Snapshot;
use crate::transport::{ClientEvent, Connector, Envelope, TransportClient, TransportOptions};

/// Default envelope tag for snapshots
pub const DEFAULT_SNAPSHOT_TAG: &str = "snapshot";

/// Downstream publisher for snapshots
#[derive(Debug, Clone)]
pub struct SnapshotRelay {
    client: TransportClient,
    tag: String,
}

impl SnapshotRelay {
    /// Relay over an existing client
    pub fn new(client: TransportClient, tag: impl Into<String>) -> Self {
        Self {
            client,
            tag: tag.into(),
        }
    }

    /// Spawn a client for `connector` and log its lifecycle
    ///
    /// The connection is not opened until [`connect`](Self::connect).
    pub fn spawn<C: Connector>(
        connector: C,
        options: TransportOptions,
        tag: impl Into<String>,
    ) -> (Self, JoinHandle<()>) {
        let (client, events) = TransportClient::spawn::<C, Envelope>("overlay", connector, options);
        let logger = tokio::spawn(log_events(events));
        (Self::new(client, tag), logger)
    }

    /// Open the downstream connection
    pub fn connect(&self) {
        self.client.connect();
    }

    /// Close the downstream connection
    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    /// Publish a snapshot, replacing the previously published one
    pub fn publish(&self, snapshot: &Snapshot) {
        match Envelope::wrap(self.tag.as_str(), snapshot).and_then(|e| e.encode()) {
            Ok(payload) => self.client.send_sticky(payload),
            Err(e) => warn!(error = %e, "Failed to encode snapshot"),
        }
    }
}

async fn log_events(mut events: mpsc::UnboundedReceiver<ClientEvent<Envelope>>) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Opened => info!("Overlay connected"),
            ClientEvent::Closed {
                reconnect_in: Some(delay),
            } => warn!(
                retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Overlay connection lost"
            ),
            ClientEvent::Closed { reconnect_in: None } => info!("Overlay disconnected"),
            ClientEvent::Error(e) => warn!(error = %e, "Overlay connection error"),
            ClientEvent::Message(envelope) => {
                debug!(tag = %envelope.tag, "Ignoring message from overlay");
            }
        }
    }
}
