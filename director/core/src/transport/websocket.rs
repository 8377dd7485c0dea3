//! WebSocket Connector
//!
//! Opens a client WebSocket with `tokio-tungstenite` and services it with a
//! reader and a writer task, the same split the Unix socket client uses.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use super::{Connector, Link, LinkEvent, TransportError};

/// Capacity of the inbound queue of each link
const LINK_BUFFER: usize = 100;

/// Connector for `ws://` and `wss://` endpoints
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    /// Create a connector for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self) -> Result<Link, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {e}", self.url)))?;

        let (mut sink, mut source) = stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming_rx) = mpsc::channel(LINK_BUFFER);

        // Write task: outgoing_rx -> socket. Ends when the client drops the link.
        tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(text)).await {
                    debug!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        // Read task: socket -> incoming_tx. Dropping incoming_tx signals close.
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => LinkEvent::Message(text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = incoming_tx
                            .send(LinkEvent::Error(TransportError::ReceiveFailed(
                                e.to_string(),
                            )))
                            .await;
                        break;
                    }
                };
                if incoming_tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!("WebSocket reader finished");
        });

        Ok(Link {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
        })
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}
