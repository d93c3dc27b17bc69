//! Types shared by the dial-out and listen-in sessions.

use crate::{
    constants::MAX_EVENT_QUEUE_SIZE,
    decoder::DecoderConfig,
    error::{EslError, EslResult},
    event::{Classified, EventRegistry},
    id::{IdGenerator, UuidGenerator},
    reply::Reply,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot, watch};

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    /// Socket is up, not yet usable for application commands.
    Connected,
    Authenticating,
    Ready,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Reason for disconnection
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Switch sent `text/disconnect-notice`
    ServerNotice,
    /// Switch sent `text/rude-rejection`
    Rejected,
    /// TCP I/O error (io::Error is not Clone, so we store the message)
    IoError(String),
    /// Clean EOF on the socket
    ConnectionClosed,
    /// Application asked to disconnect, or dropped every handle
    ClientRequested,
    /// Oversized frame or a fatal protocol violation
    ProtocolError(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ServerNotice => write!(f, "server sent disconnect notice"),
            DisconnectReason::Rejected => write!(f, "server rejected the connection"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ClientRequested => write!(f, "client requested disconnect"),
            DisconnectReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
        }
    }
}

/// Snapshot published by the connection task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Last rejected `auth`/`connect` reply text, cleared on retry.
    pub auth_error: Option<String>,
    /// Set once the session reaches `Disconnected`.
    pub disconnect_reason: Option<DisconnectReason>,
}

impl SessionStatus {
    pub(crate) fn connected() -> Self {
        Self {
            state: SessionState::Connected,
            ..Self::default()
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Not yet closing or closed.
    pub fn is_connected(&self) -> bool {
        !matches!(
            self.state,
            SessionState::Disconnected | SessionState::Closing
        )
    }
}

/// What the connection does with a protocol violation (stray reply, or a
/// malformed header line under strict decoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationPolicy {
    /// Close the connection.
    #[default]
    Fatal,
    /// Log at `warn` and keep going.
    LogAndDrop,
}

fn default_id_generator() -> Arc<dyn IdGenerator> {
    Arc::new(UuidGenerator)
}

/// Per-connection settings fixed when the connection starts.
///
/// Use [`SessionOptions::dial_out()`] or [`SessionOptions::listen_in()`]
/// for the role defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Capacity of the mpsc channel delivering events. Default: 1000.
    pub event_queue_size: usize,
    pub decoder: DecoderConfig,
    pub violation_policy: ViolationPolicy,
    /// Assigns tokens to commands sent without one.
    #[serde(skip, default = "default_id_generator")]
    pub id_generator: Arc<dyn IdGenerator>,
    /// Maps event names to typed variants.
    #[serde(skip)]
    pub registry: EventRegistry,
}

impl SessionOptions {
    /// Strict decoding, violations close the connection.
    pub fn dial_out() -> Self {
        Self {
            event_queue_size: MAX_EVENT_QUEUE_SIZE,
            decoder: DecoderConfig::default(),
            violation_policy: ViolationPolicy::Fatal,
            id_generator: default_id_generator(),
            registry: EventRegistry::default(),
        }
    }

    /// Lenient decoding, violations are logged and dropped.
    pub fn listen_in() -> Self {
        Self {
            decoder: DecoderConfig::lenient(),
            violation_policy: ViolationPolicy::LogAndDrop,
            ..Self::dial_out()
        }
    }

    pub fn with_id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn with_registry(mut self, registry: EventRegistry) -> Self {
        self.registry = registry;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::dial_out()
    }
}

/// Eventual reply to one command.
///
/// Dropping it detaches the caller only: the command stays queued so later
/// replies still line up with their commands.
#[must_use = "a PendingReply does nothing unless awaited"]
#[derive(Debug)]
pub struct PendingReply {
    token: Option<String>,
    rx: oneshot::Receiver<EslResult<Reply>>,
}

impl PendingReply {
    pub(crate) fn new(token: Option<String>, rx: oneshot::Receiver<EslResult<Reply>>) -> Self {
        Self { token, rx }
    }

    /// Already resolved with `error`.
    pub(crate) fn failed(error: EslError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self { token: None, rx }
    }

    /// Token assigned to the command.
    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
    }

    /// Wait at most `duration`; on expiry the command stays queued.
    pub async fn with_timeout(self, duration: Duration) -> EslResult<Reply> {
        match tokio::time::timeout(duration, self).await {
            Ok(result) => result,
            Err(_) => Err(EslError::Timeout {
                timeout_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

impl Future for PendingReply {
    type Output = EslResult<Reply>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(EslError::ConnectionClosed)))
    }
}

/// Item delivered on an [`EventStream`].
pub type EventItem = EslResult<Classified>;

/// Event stream receiver (!Clone)
///
/// Events are delivered as `Result<Classified, EslError>`. An
/// `Err(EslError::QueueFull)` indicates that one or more events were dropped
/// because the application fell behind. The stream ends when the connection
/// closes.
pub struct EventStream {
    rx: mpsc::Receiver<EventItem>,
    status_rx: watch::Receiver<SessionStatus>,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::Receiver<EventItem>, status_rx: watch::Receiver<SessionStatus>) -> Self {
        Self { rx, status_rx }
    }

    /// Receive the next event, or None once the connection has closed.
    pub async fn recv(&mut self) -> Option<EventItem> {
        self.rx
            .recv()
            .await
    }

    /// Whether the connection is alive (not yet closing or closed).
    pub fn is_connected(&self) -> bool {
        self.status_rx
            .borrow()
            .is_connected()
    }

    /// Current connection status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status_rx
            .borrow()
            .clone()
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl futures_util::Stream for EventStream {
    type Item = EventItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx
            .poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decoder::MalformedLinePolicy, frame::Frame};

    #[test]
    fn test_role_defaults() {
        let dial_out = SessionOptions::dial_out();
        assert_eq!(dial_out.violation_policy, ViolationPolicy::Fatal);
        assert_eq!(dial_out.decoder.malformed_lines, MalformedLinePolicy::Reject);
        assert_eq!(dial_out.event_queue_size, MAX_EVENT_QUEUE_SIZE);

        let listen_in = SessionOptions::listen_in();
        assert_eq!(listen_in.violation_policy, ViolationPolicy::LogAndDrop);
        assert_eq!(
            listen_in.decoder.malformed_lines,
            MalformedLinePolicy::AppendToBody
        );
    }

    #[test]
    fn test_options_from_json() {
        let options: SessionOptions = serde_json::from_str(
            r#"{"event_queue_size": 16, "violation_policy": "log_and_drop"}"#,
        )
        .unwrap();
        assert_eq!(options.event_queue_size, 16);
        assert_eq!(options.violation_policy, ViolationPolicy::LogAndDrop);
        assert_eq!(options.decoder.malformed_lines, MalformedLinePolicy::Reject);
        assert!(options
            .registry
            .contains("HEARTBEAT"));
        assert!(!options
            .id_generator
            .next_id()
            .is_empty());
    }

    #[test]
    fn test_status_predicates() {
        let mut status = SessionStatus::connected();
        assert!(status.is_connected());
        assert!(!status.is_ready());
        status.state = SessionState::Ready;
        assert!(status.is_ready());
        status.state = SessionState::Closing;
        assert!(!status.is_connected());
        assert_eq!(SessionStatus::default().state, SessionState::Disconnected);
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(
            DisconnectReason::IoError("broken pipe".into()).to_string(),
            "I/O error: broken pipe"
        );
        assert_eq!(
            DisconnectReason::Rejected.to_string(),
            "server rejected the connection"
        );
    }

    #[tokio::test]
    async fn test_pending_reply_resolves() {
        let (tx, rx) = oneshot::channel();
        let pending = PendingReply::new(Some("t-1".into()), rx);
        assert_eq!(pending.token(), Some("t-1"));
        let frame = Frame::from_parts(
            &[("Content-Type", "command/reply"), ("Reply-Text", "+OK")],
            &[],
        );
        tx.send(Ok(Reply::from_frame(frame)))
            .unwrap();
        assert!(pending
            .await
            .unwrap()
            .is_ok());
    }

    #[tokio::test]
    async fn test_pending_reply_sender_dropped() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        assert!(matches!(
            PendingReply::new(None, rx).await,
            Err(EslError::ConnectionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_reply_timeout() {
        let (_tx, rx) = oneshot::channel();
        let result = PendingReply::new(None, rx)
            .with_timeout(Duration::from_millis(250))
            .await;
        assert!(matches!(result, Err(EslError::Timeout { timeout_ms: 250 })));
    }

    #[tokio::test]
    async fn test_failed_pending_reply() {
        let pending = PendingReply::failed(EslError::invalid_command("bad"));
        assert!(matches!(
            pending.await,
            Err(EslError::InvalidCommand { .. })
        ));
    }
}
