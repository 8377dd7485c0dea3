//! Resilient Transport Client
//!
//! A message channel that survives its peer going away. The client:
//!
//! - reconnects automatically with exponential backoff after an unexpected
//!   close or a failed open attempt,
//! - buffers outbound payloads while disconnected and flushes them, in order
//!   and exactly once, when the channel opens,
//! - replays the latest *sticky* payload on every open so a freshly connected
//!   peer is never left with stale state,
//! - offers an unbuffered send for request/response traffic that only makes
//!   sense on the connection it was issued on,
//! - decodes inbound frames into a closed [`WireMessage`] type and drops
//!   unknown tags.
//!
//! # Architecture
//!
//! ```text
//! TransportClient (handle, Clone)
//!     │ Command::{Connect, Disconnect, Reconnect, Send}
//!     ▼
//! ClientActor (task) ── owns ConnectionState, OutboundBuffer, RetryState
//!     │        ▲
//!     │ open() │ LinkEvent
//!     ▼        │
//! Connector ─► Link (writer / reader tasks)
//!     │
//!     ▼ ClientEvent<M>
//! owner
//! ```
//!
//! All state lives in the actor task; the handle only enqueues commands, so
//! `send` never blocks and never fails the caller.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::retry::RetryState;
use super::{ClientEvent, Connector, Link, LinkEvent, TransportError, TransportOptions, WireMessage};

/// Connection state of one transport client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel, possibly waiting for a reconnect timer
    Disconnected,
    /// An open attempt is in progress
    Connecting,
    /// Channel is open
    Connected,
}

/// Payloads waiting for the next successful open
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    pending: VecDeque<String>,
}

impl OutboundBuffer {
    /// Append a payload
    pub fn push(&mut self, payload: String) {
        self.pending.push_back(payload);
    }

    /// Number of buffered payloads
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is buffered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remove and return every buffered payload in FIFO order
    pub fn take(&mut self) -> Vec<String> {
        self.pending.drain(..).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
    /// Buffered while disconnected
    Buffered,
    /// Kept for replay on every open
    Sticky,
    /// Sent on the open channel or dropped
    Immediate,
}

enum Command {
    Connect,
    Disconnect,
    Reconnect,
    Send { payload: String, delivery: Delivery },
}

/// Handle to a resilient transport client
///
/// Cheap to clone; every clone drives the same connection. The client task
/// exits when the last handle is dropped.
#[derive(Clone, Debug)]
pub struct TransportClient {
    label: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => write!(f, "Connect"),
            Self::Disconnect => write!(f, "Disconnect"),
            Self::Reconnect => write!(f, "Reconnect"),
            Self::Send { delivery, .. } => write!(f, "Send {{ delivery: {delivery:?} }}"),
        }
    }
}

impl TransportClient {
    /// Spawn a client task for `connector`
    ///
    /// The client starts disconnected; call [`connect`](Self::connect) to
    /// open the channel. Lifecycle events and decoded messages arrive on the
    /// returned receiver.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<C, M>(
        label: impl Into<String>,
        connector: C,
        options: TransportOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent<M>>)
    where
        C: Connector,
        M: WireMessage,
    {
        let label: Arc<str> = Arc::from(label.into());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = ClientActor {
            label: Arc::clone(&label),
            connector: Arc::new(connector),
            options,
            state: ConnectionState::Disconnected,
            state_tx,
            retry: RetryState::new(),
            retry_before_open: RetryState::new(),
            buffer: OutboundBuffer::default(),
            sticky: None,
            explicitly_disconnected: false,
            reconnect_at: None,
            opening: None,
            link: None,
            commands: command_rx,
            events: event_tx,
        };
        tokio::spawn(actor.run());

        (
            Self {
                label,
                commands: command_tx,
                state: state_rx,
            },
            event_rx,
        )
    }

    /// Open the channel
    ///
    /// No-op while connected or connecting. Cancels a pending reconnect
    /// timer and re-enables automatic reconnects after [`disconnect`](Self::disconnect).
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close the channel and stop reconnecting
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Drop the current channel and reconnect after the backoff delay
    ///
    /// For owners that reject a channel after it opened (a failed handshake).
    /// The backoff keeps growing across such rejected opens. No-op while
    /// disconnected.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Send a payload, buffering it while disconnected
    pub fn send(&self, payload: impl Into<String>) {
        self.command(Command::Send {
            payload: payload.into(),
            delivery: Delivery::Buffered,
        });
    }

    /// Send a payload on the open channel only
    ///
    /// If the channel is not open when the client task handles the payload it
    /// is dropped. It is never buffered or replayed on a later connection.
    pub fn send_now(&self, payload: impl Into<String>) {
        self.command(Command::Send {
            payload: payload.into(),
            delivery: Delivery::Immediate,
        });
    }

    /// Send a payload and keep it for replay on every future open
    ///
    /// While disconnected the payload is not buffered; it is sent once the
    /// channel opens, replacing any earlier sticky payload.
    pub fn send_sticky(&self, payload: impl Into<String>) {
        self.command(Command::Send {
            payload: payload.into(),
            delivery: Delivery::Sticky,
        });
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Whether the channel is currently open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch connection state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Label used in log lines
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(client = %self.label, "Client task has stopped, dropping command");
        }
    }
}

struct ClientActor<C, M> {
    label: Arc<str>,
    connector: Arc<C>,
    options: TransportOptions,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    retry: RetryState,
    retry_before_open: RetryState,
    buffer: OutboundBuffer,
    sticky: Option<String>,
    explicitly_disconnected: bool,
    reconnect_at: Option<Instant>,
    opening: Option<JoinHandle<Result<Link, TransportError>>>,
    link: Option<Link>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ClientEvent<M>>,
}

impl<C: Connector, M: WireMessage> ClientActor<C, M> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                opened = wait_for_open(&mut self.opening) => self.handle_open_result(opened),
                event = recv_link(&mut self.link) => self.handle_link_event(event),
                () = wait_until(self.reconnect_at) => {
                    self.reconnect_at = None;
                    info!(client = %self.label, "Reconnecting");
                    self.start_open();
                }
            }
        }

        if let Some(opening) = self.opening.take() {
            opening.abort();
        }
        self.link = None;
        debug!(client = %self.label, "All handles dropped, client task stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => {
                if self.state != ConnectionState::Disconnected {
                    trace!(client = %self.label, state = ?self.state, "Already connected or connecting");
                    return;
                }
                self.explicitly_disconnected = false;
                self.reconnect_at = None;
                self.start_open();
            }
            Command::Disconnect => {
                self.reconnect_at = None;
                self.explicitly_disconnected = true;

                if let Some(opening) = self.opening.take() {
                    opening.abort();
                }
                let was_active = self.state != ConnectionState::Disconnected;
                self.link = None;
                self.set_state(ConnectionState::Disconnected);

                if was_active {
                    info!(client = %self.label, "Disconnected");
                    self.emit(ClientEvent::Closed { reconnect_in: None });
                }
            }
            Command::Reconnect => {
                if self.explicitly_disconnected || self.state == ConnectionState::Disconnected {
                    trace!(client = %self.label, "Nothing to reconnect");
                    return;
                }
                if let Some(opening) = self.opening.take() {
                    opening.abort();
                }
                if self.link.take().is_some() {
                    // The open that produced this link did not count as a success.
                    self.retry = self.retry_before_open.clone();
                }
                info!(client = %self.label, "Dropping channel on request");
                self.handle_closed();
            }
            Command::Send { payload, delivery } => {
                if delivery == Delivery::Sticky {
                    self.sticky = Some(payload.clone());
                }

                match (self.state, delivery) {
                    (ConnectionState::Connected, Delivery::Immediate) => {
                        if let Err(payload) = self.write(payload) {
                            debug!(
                                client = %self.label,
                                bytes = payload.len(),
                                "Writer has stopped, dropping unbuffered send"
                            );
                        }
                    }
                    (ConnectionState::Connected, _) => self.transmit(payload),
                    (_, Delivery::Buffered) => {
                        if self.options.log_frames {
                            debug!(client = %self.label, payload = %payload, "Buffered send");
                        }
                        self.buffer.push(payload);
                    }
                    (_, Delivery::Immediate) => {
                        debug!(
                            client = %self.label,
                            bytes = payload.len(),
                            "Not connected, dropping unbuffered send"
                        );
                    }
                    (_, Delivery::Sticky) => {}
                }
            }
        }
    }

    fn start_open(&mut self) {
        self.set_state(ConnectionState::Connecting);
        debug!(client = %self.label, endpoint = %self.connector.endpoint(), "Connecting");

        let connector = Arc::clone(&self.connector);
        self.opening = Some(tokio::spawn(async move { connector.open().await }));
    }

    fn handle_open_result(&mut self, result: Result<Link, TransportError>) {
        match result {
            Ok(link) => {
                self.link = Some(link);
                self.set_state(ConnectionState::Connected);

                let buffered = self.buffer.take();
                if !buffered.is_empty() {
                    debug!(client = %self.label, count = buffered.len(), "Sending buffer");
                }
                for payload in buffered {
                    self.transmit(payload);
                }
                if let Some(sticky) = self.sticky.clone() {
                    if self.options.log_frames {
                        debug!(client = %self.label, payload = %sticky, "(Stored state) >>>");
                    }
                    self.transmit(sticky);
                }

                self.retry_before_open = self.retry.clone();
                self.retry.reset();
                info!(client = %self.label, endpoint = %self.connector.endpoint(), "Connected");
                self.emit(ClientEvent::Opened);
            }
            Err(err) => {
                warn!(client = %self.label, error = %err, "Connection attempt failed");
                self.emit(ClientEvent::Error(err));
                self.handle_closed();
            }
        }
    }

    fn handle_link_event(&mut self, event: Option<LinkEvent>) {
        match event {
            Some(LinkEvent::Message(text)) => {
                if self.options.log_frames {
                    debug!(client = %self.label, frame = %text, "<<<");
                }
                match M::decode(&text) {
                    Ok(message) if message.is_ignored() => {
                        trace!(client = %self.label, message = ?message, "Ignoring unknown message type");
                    }
                    Ok(message) => self.emit(ClientEvent::Message(message)),
                    Err(err) => {
                        warn!(client = %self.label, error = %err, "Dropping malformed frame");
                    }
                }
            }
            Some(LinkEvent::Error(err)) => {
                warn!(client = %self.label, error = %err, "Transport error");
                self.emit(ClientEvent::Error(err));
            }
            None => {
                self.link = None;
                self.handle_closed();
            }
        }
    }

    fn handle_closed(&mut self) {
        self.set_state(ConnectionState::Disconnected);

        if self.explicitly_disconnected {
            self.emit(ClientEvent::Closed { reconnect_in: None });
            return;
        }

        let delay = self.retry.next_delay(&self.options);
        self.reconnect_at = Some(Instant::now() + delay);
        warn!(
            client = %self.label,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Connection closed unexpectedly, scheduling reconnect"
        );
        self.emit(ClientEvent::Closed {
            reconnect_in: Some(delay),
        });
    }

    fn transmit(&mut self, payload: String) {
        if let Err(payload) = self.write(payload) {
            debug!(client = %self.label, "Writer has stopped, keeping payload for the next connection");
            self.buffer.push(payload);
        }
    }

    /// Hand a payload to the link writer, giving it back if there is none
    fn write(&self, payload: String) -> Result<(), String> {
        let Some(link) = self.link.as_ref() else {
            return Err(payload);
        };

        if self.options.log_frames {
            debug!(client = %self.label, frame = %payload, ">>>");
        }
        link.outgoing
            .send(payload)
            .map_err(|mpsc::error::SendError(payload)| payload)
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }

    fn emit(&self, event: ClientEvent<M>) {
        // The owner may have dropped its receiver; the client keeps running.
        let _ = self.events.send(event);
    }
}

async fn wait_for_open(
    opening: &mut Option<JoinHandle<Result<Link, TransportError>>>,
) -> Result<Link, TransportError> {
    let Some(handle) = opening.as_mut() else {
        return std::future::pending().await;
    };
    let result = handle.await;
    *opening = None;
    match result {
        Ok(result) => result,
        Err(join_err) => Err(TransportError::ConnectionFailed(join_err.to_string())),
    }
}

async fn recv_link(link: &mut Option<Link>) -> Option<LinkEvent> {
    match link.as_mut() {
        Some(link) => link.incoming.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::transport::in_memory::{InMemoryConnector, InMemoryPeer};
    use crate::transport::Envelope;

    #[derive(Debug, PartialEq)]
    enum TestMessage {
        Hello(String),
        Ignored { tag: String },
    }

    impl WireMessage for TestMessage {
        fn decode(text: &str) -> Result<Self, TransportError> {
            let envelope = Envelope::parse(text)?;
            match envelope.tag.as_str() {
                "hello" => Ok(Self::Hello(envelope.body_as()?)),
                _ => Ok(Self::Ignored { tag: envelope.tag }),
            }
        }

        fn is_ignored(&self) -> bool {
            matches!(self, Self::Ignored { .. })
        }
    }

    type Events = mpsc::UnboundedReceiver<ClientEvent<TestMessage>>;

    fn spawn_client() -> (
        TransportClient,
        Events,
        InMemoryConnector,
        mpsc::UnboundedReceiver<InMemoryPeer>,
    ) {
        let (connector, peers) = InMemoryConnector::new();
        let (client, events) =
            TransportClient::spawn("test", connector.clone(), TransportOptions::for_testing());
        (client, events, connector, peers)
    }

    async fn expect_opened(events: &mut Events) {
        match events.recv().await {
            Some(ClientEvent::Opened) => {}
            other => panic!("expected Opened, got {other:?}"),
        }
    }

    async fn expect_closed(events: &mut Events) -> Option<Duration> {
        match events.recv().await {
            Some(ClientEvent::Closed { reconnect_in }) => reconnect_in,
            other => panic!("expected Closed, got {other:?}"),
        }
    }

    async fn expect_error(events: &mut Events) {
        match events.recv().await {
            Some(ClientEvent::Error(_)) => {}
            other => panic!("expected Error, got {other:?}"),
        }
    }

    fn drain(peer: &mut InMemoryPeer) -> Vec<String> {
        let mut received = Vec::new();
        while let Ok(frame) = peer.received.try_recv() {
            received.push(frame);
        }
        received
    }

    #[test]
    fn test_outbound_buffer_is_fifo() {
        let mut buffer = OutboundBuffer::default();
        buffer.push("a".into());
        buffer.push("b".into());
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.take(), vec!["a".to_string(), "b".to_string()]);
        assert!(buffer.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_sends_flush_in_order_once() {
        let (client, mut events, _connector, mut peers) = spawn_client();

        client.send("one");
        client.send("two");
        client.send("three");
        client.connect();

        let mut peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
        assert_eq!(drain(&mut peer), vec!["one", "two", "three"]);

        client.send("four");
        assert_eq!(peer.received.recv().await.unwrap(), "four");

        // A reconnect must not resend anything that was already flushed.
        drop(peer);
        assert!(expect_closed(&mut events).await.is_some());
        let mut peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
        assert!(drain(&mut peer).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_twice_opens_one_channel() {
        let (client, mut events, connector, _peers) = spawn_client();

        client.connect();
        client.connect();
        expect_opened(&mut events).await;
        client.connect();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.attempts(), 1);
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_disconnect_never_reconnects() {
        let (client, mut events, connector, mut peers) = spawn_client();

        client.connect();
        let mut peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;

        client.disconnect();
        assert_eq!(expect_closed(&mut events).await, None);
        assert_eq!(peer.received.recv().await, None);

        client.disconnect();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let (client, mut events, connector, mut peers) = spawn_client();

        client.connect();
        let peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;

        drop(peer);
        assert!(expect_closed(&mut events).await.is_some());
        client.disconnect();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_then_resets_after_success() {
        let (client, mut events, connector, mut peers) = spawn_client();

        client.connect();
        let peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;

        connector.fail_next(3);
        drop(peer);

        assert_eq!(expect_closed(&mut events).await, Some(Duration::from_millis(100)));
        for expected in [200, 400, 800] {
            expect_error(&mut events).await;
            assert_eq!(
                expect_closed(&mut events).await,
                Some(Duration::from_millis(expected))
            );
        }

        let peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
        assert_eq!(connector.attempts(), 5);

        drop(peer);
        assert_eq!(expect_closed(&mut events).await, Some(Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_for_backoff_delay() {
        let (client, mut events, connector, mut peers) = spawn_client();

        client.connect();
        let peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;

        let closed_at = Instant::now();
        drop(peer);
        expect_closed(&mut events).await;
        let _peer = peers.recv().await.unwrap();

        let times = connector.attempt_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - closed_at >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sticky_payload_replays_on_reconnect() {
        let (client, mut events, _connector, mut peers) = spawn_client();

        client.send_sticky("offline-state");
        client.connect();
        let mut peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
        assert_eq!(drain(&mut peer), vec!["offline-state"]);

        client.send_sticky("state-1");
        assert_eq!(peer.received.recv().await.unwrap(), "state-1");

        drop(peer);
        expect_closed(&mut events).await;
        let mut peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
        assert_eq!(drain(&mut peer), vec!["state-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_now_is_never_buffered() {
        let (client, mut events, _connector, mut peers) = spawn_client();

        client.send_now("while-offline");
        client.connect();
        let mut peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
        assert!(drain(&mut peer).is_empty());

        client.send_now("request-1");
        assert_eq!(peer.received.recv().await.unwrap(), "request-1");

        // Issued after the peer went away but before the close was noticed.
        drop(peer);
        client.send_now("request-2");
        assert!(expect_closed(&mut events).await.is_some());

        let mut peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
        assert!(drain(&mut peer).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_request_backs_off_across_rejected_opens() {
        let (client, mut events, connector, mut peers) = spawn_client();

        client.connect();
        let mut peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;

        client.reconnect();
        assert_eq!(expect_closed(&mut events).await, Some(Duration::from_millis(100)));
        assert_eq!(peer.received.recv().await, None);

        let _peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
        client.reconnect();
        assert_eq!(expect_closed(&mut events).await, Some(Duration::from_millis(200)));

        let peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
        assert_eq!(connector.attempts(), 3);

        // An ordinary drop after an accepted open starts over.
        drop(peer);
        assert_eq!(expect_closed(&mut events).await, Some(Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_request_is_ignored_when_disconnected() {
        let (client, mut events, connector, mut peers) = spawn_client();

        client.reconnect();
        client.connect();
        let _peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;

        client.disconnect();
        assert_eq!(expect_closed(&mut events).await, None);
        client.reconnect();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_and_malformed_frames_are_dropped() {
        let (client, mut events, _connector, mut peers) = spawn_client();

        client.connect();
        let peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;

        peer.push(r#"{"type":"mystery","body":{"x":1}}"#).await;
        peer.push("{not json").await;
        peer.push(r#"{"type":"hello","body":"world"}"#).await;

        match events.recv().await {
            Some(ClientEvent::Message(message)) => {
                assert_eq!(message, TestMessage::Hello("world".to_string()));
            }
            other => panic!("expected Message, got {other:?}"),
        }
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_error_is_reported_and_followed_by_reconnect() {
        let (client, mut events, _connector, mut peers) = spawn_client();

        client.connect();
        let peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;

        peer.fail("reset by peer").await;
        expect_error(&mut events).await;
        assert!(expect_closed(&mut events).await.is_some());

        let _peer = peers.recv().await.unwrap();
        expect_opened(&mut events).await;
    }
}
