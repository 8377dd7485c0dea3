//! Judging Event Feed
//!
//! Decodes messages from the judging server and maps them onto
//! [`EventStore`] operations.
//!
//! | tag               | store operation  |
//! |-------------------|------------------|
//! | `judging:init`    | `init_event`     |
//! | `judging:start`   | `init_event`     |
//! | `judging:update`  | `update_event`   |
//! | `judging:end`     | `end_event`      |
//! | anything else     | ignored          |
//!
//! The event id is the body's `event_id`. The whole body becomes the event
//! info (for init) or the state update (for update).

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::EventId;
use crate::store::{EventStore, StoreError};
use crate::transport::{
    ClientEvent, Connector, Envelope, TransportClient, TransportError, TransportOptions,
    WireMessage,
};

/// Decoded judging message
#[derive(Debug, Clone, PartialEq)]
pub enum JudgingMessage {
    /// An event was announced or (re)started
    Init {
        /// Event id
        id: EventId,
        /// Full message body
        info: Value,
    },
    /// Live data for a running event
    Update {
        /// Event id
        id: EventId,
        /// Full message body
        state: Value,
    },
    /// The event finished
    End {
        /// Event id
        id: EventId,
    },
    /// A tag this feed does not act on
    Ignored {
        /// The tag
        tag: String,
    },
}

fn event_id(envelope: &Envelope) -> Result<EventId, TransportError> {
    envelope
        .body
        .get("event_id")
        .and_then(EventId::from_value)
        .ok_or_else(|| {
            TransportError::SerializationError(format!("{} without event_id", envelope.tag))
        })
}

impl JudgingMessage {
    /// Interpret an envelope
    ///
    /// # Errors
    ///
    /// Returns `TransportError::SerializationError` if a known tag lacks a
    /// usable `event_id`.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, TransportError> {
        match envelope.tag.as_str() {
            "judging:init" | "judging:start" => Ok(Self::Init {
                id: event_id(&envelope)?,
                info: envelope.body,
            }),
            "judging:update" => Ok(Self::Update {
                id: event_id(&envelope)?,
                state: envelope.body,
            }),
            "judging:end" => Ok(Self::End {
                id: event_id(&envelope)?,
            }),
            _ => Ok(Self::Ignored { tag: envelope.tag }),
        }
    }
}

impl WireMessage for JudgingMessage {
    fn decode(text: &str) -> Result<Self, TransportError> {
        Self::from_envelope(Envelope::parse(text)?)
    }

    fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored { .. })
    }
}

/// Applies judging messages to the store
#[derive(Debug, Clone)]
pub struct EventFeed {
    store: EventStore,
}

impl EventFeed {
    /// Feed writing into `store`
    #[must_use]
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }

    /// Apply one message
    pub fn handle(&self, message: JudgingMessage) {
        match message {
            JudgingMessage::Init { id, info } => self.store.init_event(id, info),
            JudgingMessage::Update { id, state } => {
                if let Err(StoreError::UnknownEvent(id)) = self.store.update_event(&id, state) {
                    warn!(event_id = %id, "Update for unknown event ignored");
                }
            }
            JudgingMessage::End { id } => {
                self.store.end_event(&id);
            }
            JudgingMessage::Ignored { tag } => debug!(tag = %tag, "Ignoring judging message"),
        }
    }

    /// Consume client events until the client goes away
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<ClientEvent<JudgingMessage>>) {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Opened => info!("Connected to judging feed"),
                ClientEvent::Closed {
                    reconnect_in: Some(delay),
                } => warn!(
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Lost connection to judging feed"
                ),
                ClientEvent::Closed { reconnect_in: None } => {
                    info!("Disconnected from judging feed");
                }
                ClientEvent::Error(e) => warn!(error = %e, "Judging feed error"),
                ClientEvent::Message(message) => self.handle(message),
            }
        }
    }

    /// Spawn a client for `connector` feeding this store
    ///
    /// The returned client is not connected yet.
    pub fn spawn<C: Connector>(
        self,
        connector: C,
        options: TransportOptions,
    ) -> (TransportClient, JoinHandle<()>) {
        let (client, events) =
            TransportClient::spawn::<C, JudgingMessage>("stream", connector, options);
        let task = tokio::spawn(self.run(events));
        (client, task)
    }
}
