//! OBS Scene Switcher
//!
//! [`ObsExecutor`] drives an obs-websocket (protocol v4) server through a
//! [`TransportClient`], so reconnects follow the same backoff as every other
//! channel.
//!
//! # Handshake
//!
//! ```text
//! Opened ──► GetAuthRequired ──► authRequired? ──no──► ready
//!                                     │yes
//!                                     ▼
//!                             Authenticate{auth} ──ok──► ready
//! ```
//!
//! The executor reports itself connected only once the handshake finished.
//! Becoming ready schedules an update so the current scene is pushed right
//! away. A failed handshake drops the connection and the client reconnects
//! after its backoff delay.
//!
//! Requests are sent unbuffered: a request issued on a connection that has
//! just gone away is lost with it and never reaches the next connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{DeviceError, DeviceExecutor};
use crate::rules::Action;
use crate::scheduler::ScheduleHandle;
use crate::transport::{
    ClientEvent, Connector, TransportClient, TransportError, TransportOptions, WireMessage,
};

/// Default time to wait for a response
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Wire format
// ============================================================================

/// Response to a request sent by this client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObsResponse {
    /// Echo of the request's `message-id`
    #[serde(rename = "message-id")]
    pub message_id: String,
    /// `"ok"` or `"error"`
    pub status: String,
    /// Error text when `status` is `"error"`
    #[serde(default)]
    pub error: Option<String>,
    /// `GetAuthRequired`: whether a password is needed
    #[serde(rename = "authRequired", default)]
    pub auth_required: Option<bool>,
    /// `GetAuthRequired`: authentication challenge
    #[serde(default)]
    pub challenge: Option<String>,
    /// `GetAuthRequired`: password salt
    #[serde(default)]
    pub salt: Option<String>,
}

impl ObsResponse {
    /// Whether the device reported an error
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

/// Inbound frame from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObsMessage {
    /// Response to one of our requests
    Response(ObsResponse),
    /// Unsolicited event (`update-type`), not used
    Ignored {
        /// The event's `update-type`
        tag: String,
    },
}

impl WireMessage for ObsMessage {
    fn decode(text: &str) -> Result<Self, TransportError> {
        let value: Value = serde_json::from_str(text)?;
        if value.get("message-id").is_some() {
            return Ok(Self::Response(serde_json::from_value(value)?));
        }
        match value.get("update-type").and_then(Value::as_str) {
            Some(tag) => Ok(Self::Ignored {
                tag: tag.to_string(),
            }),
            None => Err(TransportError::SerializationError(
                "frame is neither a response nor an event".into(),
            )),
        }
    }

    fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored { .. })
    }
}

/// Compute the `auth` field of an `Authenticate` request
///
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
#[must_use]
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

// ============================================================================
// Executor
// ============================================================================

struct Shared {
    client: TransportClient,
    password: Option<String>,
    request_timeout: Duration,
    ready: AtomicBool,
    epoch: AtomicU64,
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<ObsResponse>>>,
}

/// [`DeviceExecutor`] for OBS
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct ObsExecutor {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ObsExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsExecutor")
            .field("ready", &self.shared.ready.load(Ordering::SeqCst))
            .field("state", &self.shared.client.state())
            .finish_non_exhaustive()
    }
}

impl ObsExecutor {
    /// Spawn the client and its event pump
    ///
    /// `on_ready` is signalled every time the handshake completes. The
    /// connection is not opened until [`connect`](Self::connect). Aborting
    /// the returned pump task releases the connection.
    pub fn spawn<C: Connector>(
        connector: C,
        options: TransportOptions,
        password: Option<String>,
        request_timeout: Duration,
        on_ready: ScheduleHandle,
    ) -> (Self, JoinHandle<()>) {
        let (client, events) = TransportClient::spawn::<C, ObsMessage>("obs", connector, options);
        let shared = Arc::new(Shared {
            client,
            password,
            request_timeout,
            ready: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        });
        let pump = tokio::spawn(pump(Arc::clone(&shared), events, on_ready));
        (Self { shared }, pump)
    }

    /// Open the connection (reconnects are automatic from then on)
    pub fn connect(&self) {
        self.shared.client.connect();
    }

    /// Close the connection for good
    pub fn disconnect(&self) {
        self.shared.client.disconnect();
    }

    /// The underlying transport client
    #[must_use]
    pub fn client(&self) -> &TransportClient {
        &self.shared.client
    }
}

#[async_trait]
impl DeviceExecutor for ObsExecutor {
    async fn execute(&self, action: &Action) -> Result<(), DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        match action {
            Action::SetScene { scene } => {
                info!(scene = %scene, "Switching scene");
                let mut fields = Map::new();
                fields.insert("scene-name".into(), json!(scene));
                self.shared.request("SetCurrentScene", fields).await?;
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    fn connection_epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::SeqCst)
    }
}

impl Shared {
    async fn request(
        &self,
        request_type: &str,
        mut fields: Map<String, Value>,
    ) -> Result<ObsResponse, DeviceError> {
        if !self.client.is_connected() {
            return Err(DeviceError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        fields.insert("request-type".into(), json!(request_type));
        fields.insert("message-id".into(), json!(id));

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);
        self.client.send_now(Value::Object(fields).to_string());

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(DeviceError::Disconnected),
            Err(_) => {
                self.pending.lock().remove(&id);
                return Err(DeviceError::Timeout(self.request_timeout));
            }
        };

        if response.is_error() {
            return Err(DeviceError::Rejected {
                request: request_type.to_string(),
                reason: response.error.unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(response)
    }

    async fn authenticate(&self) -> Result<(), DeviceError> {
        let response = self.request("GetAuthRequired", Map::new()).await?;
        if response.auth_required != Some(true) {
            return Ok(());
        }

        let (Some(challenge), Some(salt)) = (response.challenge, response.salt) else {
            return Err(DeviceError::Protocol(
                "authRequired without challenge or salt".into(),
            ));
        };
        let Some(password) = self.password.as_deref() else {
            return Err(DeviceError::AuthenticationFailed(
                "server requires a password but none is configured".into(),
            ));
        };

        let mut fields = Map::new();
        fields.insert("auth".into(), json!(auth_response(password, &salt, &challenge)));
        match self.request("Authenticate", fields).await {
            Ok(_) => Ok(()),
            Err(DeviceError::Rejected { reason, .. }) => {
                Err(DeviceError::AuthenticationFailed(reason))
            }
            Err(e) => Err(e),
        }
    }

    fn resolve(&self, response: ObsResponse) {
        match self.pending.lock().remove(&response.message_id) {
            // The requester may have timed out in the meantime.
            Some(tx) => drop(tx.send(response)),
            None => debug!(message_id = %response.message_id, "Response for unknown request"),
        }
    }

    fn connection_lost(&self) {
        self.ready.store(false, Ordering::SeqCst);
        // Dropping the senders fails every outstanding request.
        self.pending.lock().clear();
    }
}

async fn pump(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<ClientEvent<ObsMessage>>,
    on_ready: ScheduleHandle,
) {
    let mut handshake: Option<JoinHandle<()>> = None;

    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Opened => {
                if let Some(task) = handshake.take() {
                    task.abort();
                }
                let shared = Arc::clone(&shared);
                let on_ready = on_ready.clone();
                handshake = Some(tokio::spawn(async move {
                    match shared.authenticate().await {
                        Ok(()) => {
                            shared.epoch.fetch_add(1, Ordering::SeqCst);
                            shared.ready.store(true, Ordering::SeqCst);
                            info!("Connected to OBS");
                            on_ready.schedule_update();
                        }
                        Err(e) => {
                            error!(error = %e, "OBS handshake failed, reconnecting");
                            shared.client.reconnect();
                        }
                    }
                }));
            }
            ClientEvent::Closed { reconnect_in } => {
                if let Some(task) = handshake.take() {
                    task.abort();
                }
                shared.connection_lost();
                match reconnect_in {
                    Some(delay) => warn!(
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Lost connection to OBS"
                    ),
                    None => info!("Disconnected from OBS"),
                }
            }
            ClientEvent::Error(e) => warn!(error = %e, "OBS connection error"),
            ClientEvent::Message(ObsMessage::Response(response)) => shared.resolve(response),
            ClientEvent::Message(ObsMessage::Ignored { .. }) => {}
        }
    }

    if let Some(task) = handshake {
        task.abort();
    }
    shared.connection_lost();
}
