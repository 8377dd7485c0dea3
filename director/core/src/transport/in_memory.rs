//! In-Memory Transport
//!
//! A [`Connector`] backed by channels instead of sockets. Each successful
//! `open()` hands the far end of the new link to the owner as an
//! [`InMemoryPeer`], which can read what the client sent, push frames back and
//! close the link. Failures can be scripted to exercise the reconnect path.
//!
//! Used for embedding (wiring two components in one process) and throughout
//! the test suite.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Connector, Link, LinkEvent, TransportError};

/// Capacity of the inbound queue of each link
const LINK_BUFFER: usize = 64;

#[derive(Debug, Default)]
struct Script {
    failures: VecDeque<String>,
    attempts: Vec<Instant>,
}

/// Connector whose links are in-process channels
#[derive(Clone, Debug)]
pub struct InMemoryConnector {
    script: Arc<Mutex<Script>>,
    peers: mpsc::UnboundedSender<InMemoryPeer>,
}

/// The far end of one in-memory link
#[derive(Debug)]
pub struct InMemoryPeer {
    /// Frames the client transmitted, in order
    pub received: mpsc::UnboundedReceiver<String>,
    inject: mpsc::Sender<LinkEvent>,
}

impl InMemoryConnector {
    /// Create a connector and the receiver on which new peers appear
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InMemoryPeer>) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        (
            Self {
                script: Arc::new(Mutex::new(Script::default())),
                peers: peers_tx,
            },
            peers_rx,
        )
    }

    /// Make the next `count` open attempts fail
    pub fn fail_next(&self, count: usize) {
        let mut script = self.script.lock();
        for n in 0..count {
            script
                .failures
                .push_back(format!("scripted failure {}", n + 1));
        }
    }

    /// Number of open attempts so far
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.script.lock().attempts.len()
    }

    /// Time of every open attempt so far
    #[must_use]
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.script.lock().attempts.clone()
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn open(&self) -> Result<Link, TransportError> {
        let failure = {
            let mut script = self.script.lock();
            script.attempts.push(Instant::now());
            script.failures.pop_front()
        };
        if let Some(reason) = failure {
            return Err(TransportError::ConnectionFailed(reason));
        }

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::channel(LINK_BUFFER);

        let peer = InMemoryPeer {
            received: outgoing_rx,
            inject: incoming_tx,
        };
        if self.peers.send(peer).is_err() {
            return Err(TransportError::ConnectionFailed(
                "no listener for in-memory peers".to_string(),
            ));
        }

        Ok(Link {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }

    fn endpoint(&self) -> String {
        "in-memory".to_string()
    }
}

impl InMemoryPeer {
    /// Deliver a text frame to the client
    pub async fn push(&self, frame: impl Into<String>) {
        // A closed client simply never sees the frame.
        let _ = self.inject.send(LinkEvent::Message(frame.into())).await;
    }

    /// Report an error to the client and close the link
    pub async fn fail(self, reason: &str) {
        let _ = self
            .inject
            .send(LinkEvent::Error(TransportError::ReceiveFailed(
                reason.to_string(),
            )))
            .await;
    }

    /// Close the link from the peer side
    pub fn close(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_hands_out_connected_peer() {
        let (connector, mut peers) = InMemoryConnector::new();
        let mut link = connector.open().await.unwrap();
        let mut peer = peers.recv().await.unwrap();

        link.outgoing.send("hi".to_string()).unwrap();
        assert_eq!(peer.received.recv().await.as_deref(), Some("hi"));

        peer.push("back").await;
        assert!(matches!(link.incoming.recv().await, Some(LinkEvent::Message(m)) if m == "back"));

        peer.close();
        assert!(link.incoming.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let (connector, _peers) = InMemoryConnector::new();
        connector.fail_next(2);

        assert!(connector.open().await.is_err());
        assert!(connector.open().await.is_err());
        assert!(connector.open().await.is_ok());
        assert_eq!(connector.attempts(), 3);
    }
}
