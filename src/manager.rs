// src/manager.rs
// The session manager: a single task that owns the transcript, the session
// state, the fallback policy and the active transport. Callers talk to it
// through the `ChatClient` handle; every external read goes through an
// immutable snapshot published on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::accumulator::TokenAccumulator;
use crate::config::DocuchatConfig;
use crate::error::TransportError;
use crate::fallback::{FailureAction, FallbackPolicy, TransportMode};
use crate::protocol::{ChatResponse, ServerEvent};
use crate::session::{ChatMessage, ConnectionStatus, SessionState};
use crate::transport::{
    ActiveTransport, SendOutcome, StreamingTransport, TransportEvent, UnaryTransport,
};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub backend_url: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
}

impl ClientOptions {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            max_reconnect_attempts: 2,
            reconnect_delay: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&DocuchatConfig> for ClientOptions {
    fn from(config: &DocuchatConfig) -> Self {
        Self {
            backend_url: config.backend_url.clone(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

/// Immutable view of the session published to the UI.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub messages: Arc<Vec<ChatMessage>>,
    pub status: ConnectionStatus,
    pub thread_id: Option<String>,
    pub reply_pending: bool,
}

impl ChatSnapshot {
    /// Whether a `send` would currently be accepted. Callers are expected
    /// to gate on this; the manager also enforces it defensively.
    pub fn can_send(&self) -> bool {
        !self.reply_pending
            && matches!(
                self.status,
                ConnectionStatus::Connected | ConnectionStatus::Fallback
            )
    }
}

#[derive(Debug)]
enum Command {
    Connect,
    Send(String),
    Clear,
    Shutdown,
}

/// Handle to a running session manager. Cheap to clone; dropping the last
/// handle shuts the manager down.
#[derive(Clone)]
pub struct ChatClient {
    cmd_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<ChatSnapshot>,
}

impl ChatClient {
    /// Spawn a session manager and immediately start connecting.
    pub fn start(options: ClientOptions) -> Result<Self, TransportError> {
        let unary = UnaryTransport::new(&options.backend_url, options.request_timeout)?;
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(ChatSnapshot {
            messages: Arc::new(Vec::new()),
            status: ConnectionStatus::Idle,
            thread_id: None,
            reply_pending: false,
        });

        let manager = SessionManager::new(options, unary, snapshot_tx);
        tokio::spawn(manager.run(cmd_rx));

        // Enter connecting right away; the queue is empty so this cannot fail.
        let _ = cmd_tx.try_send(Command::Connect);

        Ok(Self { cmd_tx, snapshot_rx })
    }

    /// Idempotent when already connected or in fallback mode.
    pub async fn connect(&self) {
        let _ = self.cmd_tx.send(Command::Connect).await;
    }

    /// Queue a user message. Silently dropped by the manager when empty, a
    /// reply is pending, or the streaming transport is not connected —
    /// check `snapshot().can_send()` first.
    pub async fn send(&self, text: impl Into<String>) {
        let _ = self.cmd_tx.send(Command::Send(text.into())).await;
    }

    /// Wipe the local transcript and session id; in streaming mode also
    /// asks the backend (best-effort) to reset server-side state.
    pub async fn clear(&self) {
        let _ = self.cmd_tx.send(Command::Clear).await;
    }

    /// Stop the manager, closing the transport and any pending reconnect.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_rx.clone()
    }
}

struct SessionManager {
    options: ClientOptions,
    session: SessionState,
    policy: FallbackPolicy,
    messages: Vec<ChatMessage>,
    accumulator: TokenAccumulator,
    reply_pending: bool,
    streaming: Option<StreamingTransport>,
    unary: UnaryTransport,
    /// At most one outstanding reconnect; re-arming replaces the deadline.
    reconnect_at: Option<Instant>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
}

impl SessionManager {
    fn new(
        options: ClientOptions,
        unary: UnaryTransport,
        snapshot_tx: watch::Sender<ChatSnapshot>,
    ) -> Self {
        let policy = FallbackPolicy::new(options.max_reconnect_attempts, options.reconnect_delay);
        Self {
            options,
            session: SessionState::new(),
            policy,
            messages: Vec::new(),
            accumulator: TokenAccumulator::new(),
            reply_pending: false,
            streaming: None,
            unary,
            reconnect_at: None,
            snapshot_tx,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<Command>) {
        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                maybe_cmd = cmd_rx.recv() => {
                    match maybe_cmd {
                        None | Some(Command::Shutdown) => break,
                        Some(Command::Connect) => self.connect().await,
                        Some(Command::Send(text)) => self.send(text).await,
                        Some(Command::Clear) => self.clear().await,
                    }
                }
                maybe_event = next_streaming_event(&mut self.streaming) => {
                    match maybe_event {
                        Some(event) => self.handle_transport_event(event).await,
                        // Reader ended without a terminal event.
                        None => self.handle_stream_drop("connection lost").await,
                    }
                }
                _ = sleep_until_opt(reconnect_at) => {
                    self.reconnect_at = None;
                    self.open_streaming().await;
                }
            }
        }
        self.teardown().await;
    }

    async fn connect(&mut self) {
        if self.policy.is_fallback() {
            return;
        }
        if self.streaming.is_some()
            && matches!(
                self.session.status,
                ConnectionStatus::Connected | ConnectionStatus::Connecting
            )
        {
            return;
        }
        self.open_streaming().await;
    }

    async fn open_streaming(&mut self) {
        if self.policy.is_fallback() {
            return;
        }
        // Disarm any pending retry: a deadline left over from an earlier
        // failure must not fire into this (possibly successful) connection.
        self.reconnect_at = None;
        self.set_status(ConnectionStatus::Connecting);

        match StreamingTransport::connect(
            &self.options.backend_url,
            self.session.thread_id.as_deref(),
        )
        .await
        {
            Ok(transport) => {
                self.streaming = Some(transport);
                self.session.reconnect_attempts = 0;
                self.set_status(ConnectionStatus::Connected);
                info!("streaming transport connected");
            }
            Err(e) => {
                warn!("streaming connect failed: {e}");
                self.handle_transport_failure(ConnectionStatus::Error).await;
            }
        }
    }

    async fn send(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            debug!("ignoring empty send");
            return;
        }
        if self.reply_pending {
            debug!("ignoring send while a reply is pending");
            return;
        }
        if self.policy.mode() == TransportMode::Streaming
            && self.session.status != ConnectionStatus::Connected
        {
            debug!("ignoring send while {}", self.session.status);
            return;
        }

        // Optimistic: the user message is always shown.
        self.messages.push(ChatMessage::user(text.as_str()));
        self.reply_pending = true;
        self.publish();

        let result = match self.policy.mode() {
            TransportMode::Streaming => match self.streaming.as_ref() {
                Some(transport) => {
                    ActiveTransport::Streaming(transport)
                        .send_message(&text, self.session.thread_id.as_deref())
                        .await
                }
                None => Err(TransportError::Closed),
            },
            TransportMode::Fallback => {
                ActiveTransport::Unary(&self.unary)
                    .send_message(&text, self.session.thread_id.as_deref())
                    .await
            }
        };

        match result {
            // Streaming: the reply arrives through transport events.
            Ok(SendOutcome::Dispatched) => {}
            Ok(SendOutcome::Reply(reply)) => self.apply_unary_reply(reply),
            Err(e) if self.policy.is_fallback() => {
                // A failed unary call is a visible message, not a status change.
                warn!("unary send failed: {e}");
                self.reply_pending = false;
                self.messages.push(ChatMessage::assistant(format!("Error: {e}")));
                self.publish();
            }
            Err(e) => {
                warn!("streaming send failed: {e}");
                self.handle_stream_drop(&e.to_string()).await;
            }
        }
    }

    fn apply_unary_reply(&mut self, reply: ChatResponse) {
        if reply.has_images {
            debug!("unary reply references document images");
        }
        self.session.handshake(reply.thread_id.clone());
        self.messages.push(ChatMessage::assistant(reply.response));
        self.reply_pending = false;
        self.publish();
    }

    async fn clear(&mut self) {
        // Best-effort server-side reset; a delivery failure never blocks
        // the local clear. Purely local in fallback mode.
        if !self.policy.is_fallback() && self.session.status == ConnectionStatus::Connected {
            if let Some(transport) = self.streaming.as_ref() {
                if let Err(e) = transport.send_clear().await {
                    debug!("clear frame not delivered: {e}");
                }
            }
        }

        self.messages.clear();
        self.accumulator.reset();
        self.reply_pending = false;
        self.session.reset_thread();
        self.publish();
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                self.session.reconnect_attempts = 0;
                if !self.policy.is_fallback() {
                    self.set_status(ConnectionStatus::Connected);
                }
            }
            TransportEvent::Event(server_event) => self.handle_server_event(server_event),
            TransportEvent::Closed => self.handle_stream_drop("connection closed").await,
            TransportEvent::Failed(reason) => self.handle_stream_drop(&reason).await,
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Session { thread_id } => {
                debug!("session handshake: {thread_id}");
                self.session.handshake(thread_id);
                self.publish();
            }
            ServerEvent::Token { content } => {
                self.accumulator.push_fragment(&mut self.messages, &content);
                self.reply_pending = true;
                self.publish();
            }
            ServerEvent::Done => {
                self.accumulator.finish();
                self.reply_pending = false;
                self.publish();
            }
            ServerEvent::Error { content } => {
                // Protocol error: visible in the transcript, partial output
                // kept, connection status untouched.
                warn!("backend error: {content}");
                self.accumulator.fail(&mut self.messages, &content);
                self.reply_pending = false;
                self.publish();
            }
            ServerEvent::Cleared => {
                // Mirror the server-side reset, whether or not our own
                // clear triggered it.
                self.messages.clear();
                self.accumulator.reset();
                self.reply_pending = false;
                self.publish();
            }
            ServerEvent::Images { images } => {
                self.accumulator.attach_images(&mut self.messages, images);
                self.publish();
            }
        }
    }

    /// Unexpected close or socket error on the streaming connection.
    async fn handle_stream_drop(&mut self, reason: &str) {
        let Some(transport) = self.streaming.take() else {
            return; // already handled
        };
        transport.close().await;
        warn!("streaming transport dropped: {reason}");

        // A reply in flight can never wedge the send path: terminate it,
        // keeping any partial tokens already applied.
        if self.reply_pending {
            self.accumulator.fail(&mut self.messages, reason);
            self.reply_pending = false;
        }

        self.handle_transport_failure(ConnectionStatus::Disconnected)
            .await;
    }

    /// Route one transport failure through the fallback policy.
    async fn handle_transport_failure(&mut self, interim: ConnectionStatus) {
        match self.policy.on_failure(&mut self.session.reconnect_attempts) {
            FailureAction::RetryAfter(delay) => {
                self.set_status(interim);
                self.reconnect_at = Some(Instant::now() + delay);
                debug!(
                    "reconnect attempt {} scheduled in {:?}",
                    self.session.reconnect_attempts, delay
                );
            }
            FailureAction::SwitchToFallback => {
                info!(
                    "giving up on streaming after {} failures, switching to unary fallback",
                    self.session.reconnect_attempts
                );
                self.reconnect_at = None;
                if let Some(transport) = self.streaming.take() {
                    transport.close().await;
                }
                self.set_status(ConnectionStatus::Fallback);
            }
        }
    }

    /// The one mandatory cleanup path: runs on every exit route.
    async fn teardown(&mut self) {
        self.reconnect_at = None;
        if let Some(transport) = self.streaming.take() {
            transport.close().await;
        }
        info!("session manager stopped");
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        if self.session.status != status {
            self.session.status = status;
        }
        self.publish();
    }

    fn publish(&self) {
        let _ = self.snapshot_tx.send(ChatSnapshot {
            messages: Arc::new(self.messages.clone()),
            status: self.session.status,
            thread_id: self.session.thread_id.clone(),
            reply_pending: self.reply_pending,
        });
    }
}

async fn next_streaming_event(streaming: &mut Option<StreamingTransport>) -> Option<TransportEvent> {
    match streaming {
        Some(transport) => transport.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
