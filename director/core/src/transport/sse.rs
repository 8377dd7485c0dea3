//! Server-Sent Events Connector
//!
//! Receive-only connector for `text/event-stream` endpoints. Each SSE event is
//! rewritten into a tagged [`Envelope`] frame (`event:` becomes the tag,
//! `data:` becomes the body, parsed as JSON when possible) so consumers decode
//! SSE and WebSocket traffic the same way.
//!
//! # Wire Format
//!
//! ```text
//! event: judging:update
//! data: {"event_id": 12, "judge_id": 3, "state": {...}}
//!
//! ```

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{Connector, Envelope, Link, LinkEvent, TransportError};

/// Capacity of the inbound queue of each link
const LINK_BUFFER: usize = 100;

/// Event name used when a block carries no `event:` field
const DEFAULT_EVENT: &str = "message";

/// One dispatched SSE event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field
    pub event: String,
    /// `data:` lines joined with newlines
    pub data: String,
}

impl SseEvent {
    /// Convert into a tagged envelope
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        let body = serde_json::from_str(&self.data).unwrap_or(Value::String(self.data));
        Envelope::new(self.event, body)
    }
}

/// Incremental `text/event-stream` parser
///
/// Buffers bytes until complete lines are available and yields an event per
/// blank-line-terminated block. Comment lines and unknown fields are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Try to decode the next complete event
    ///
    /// Returns `None` when more bytes are needed.
    pub fn next_event(&mut self) -> Option<SseEvent> {
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    return Some(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseEvent {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Connector for SSE endpoints
#[derive(Clone, Debug)]
pub struct SseConnector {
    url: String,
    http: reqwest::Client,
}

impl SseConnector {
    /// Create a connector for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Connector for SseConnector {
    async fn open(&self) -> Result<Link, TransportError> {
        let response = self
            .http
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {e}", self.url)))?;

        let mut body = Box::pin(response.bytes_stream());
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let (incoming_tx, incoming_rx) = mpsc::channel(LINK_BUFFER);

        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            loop {
                tokio::select! {
                    chunk = body.next() => match chunk {
                        Some(Ok(bytes)) => {
                            decoder.push(&bytes);
                            while let Some(event) = decoder.next_event() {
                                let frame = match event.into_envelope().encode() {
                                    Ok(frame) => frame,
                                    Err(e) => {
                                        warn!(error = %e, "Dropping unencodable SSE event");
                                        continue;
                                    }
                                };
                                if incoming_tx.send(LinkEvent::Message(frame)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            let error = TransportError::ReceiveFailed(e.to_string());
                            let _ = incoming_tx.send(LinkEvent::Error(error)).await;
                            return;
                        }
                        None => return,
                    },
                    outgoing = outgoing_rx.recv() => match outgoing {
                        Some(_) => debug!("SSE links are receive-only, dropping outbound frame"),
                        None => return,
                    },
                }
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decodes_named_event() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"event: judging:init\ndata: {\"event_id\": 1}\n\n");

        let event = decoder.next_event().unwrap();
        assert_eq!(event.event, "judging:init");
        assert_eq!(event.data, "{\"event_id\": 1}");
        assert!(decoder.next_event().is_none());
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"event: judging:end\r\nda");
        assert!(decoder.next_event().is_none());
        decoder.push(b"ta: {}\r\n");
        assert!(decoder.next_event().is_none());
        decoder.push(b"\r\n");
        assert_eq!(decoder.next_event().unwrap().event, "judging:end");
    }

    #[test]
    fn test_comments_and_empty_blocks_are_skipped() {
        let mut decoder = SseDecoder::new();
        decoder.push(b": keepalive\n\nevent: ping\n\ndata: hi\n\n");

        let event = decoder.next_event().unwrap();
        assert_eq!(event.event, DEFAULT_EVENT);
        assert_eq!(event.data, "hi");
    }

    #[test]
    fn test_multiline_data_is_joined() {
        let mut decoder = SseDecoder::new();
        decoder.push(b"data: a\ndata: b\n\n");
        assert_eq!(decoder.next_event().unwrap().data, "a\nb");
    }

    #[test]
    fn test_into_envelope_parses_json_body() {
        let event = SseEvent {
            event: "judging:update".into(),
            data: r#"{"event_id":3,"state":{"round":2}}"#.into(),
        };
        let envelope = event.into_envelope();
        assert_eq!(envelope.tag, "judging:update");
        assert_eq!(envelope.body, json!({"event_id": 3, "state": {"round": 2}}));

        let plain = SseEvent {
            event: "note".into(),
            data: "not json".into(),
        };
        assert_eq!(plain.into_envelope().body, json!("not json"));
    }
}
