//! The per-connection task.
//!
//! One task owns the decoder, the correlator, the write half and the status
//! publisher. Handles talk to it through an unbounded request channel, so
//! commands reach the wire in the order they were submitted and no protocol
//! state is shared behind a lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::{
    command::{Command, EslCommand},
    constants::{HEADER_CONTENT_DISPOSITION, SOCKET_BUF_SIZE},
    correlator::{CommandCorrelator, Completion, InternalCommand},
    decoder::FrameDecoder,
    encoder::FrameEncoder,
    error::{EslError, EslResult},
    event::EventRegistry,
    frame::{ContentType, Frame},
    id::IdGenerator,
    reply::Reply,
    session::{
        DisconnectReason, EventItem, EventStream, PendingReply, SessionOptions, SessionState,
        SessionStatus, ViolationPolicy,
    },
};

/// Which side opened the socket.
pub(crate) enum Role {
    /// We connected; answer `auth/request` with this password.
    DialOut { password: String },
    /// The switch connected to us.
    ListenIn,
}

pub(crate) enum Request {
    Send {
        command: Command,
        reply_tx: oneshot::Sender<EslResult<Reply>>,
    },
    RetryAuth {
        password: String,
    },
    Handshake {
        reply_tx: oneshot::Sender<EslResult<Reply>>,
    },
    Disconnect,
}

/// Event overflow bookkeeping shared with the handles.
#[derive(Debug, Default)]
pub(crate) struct EventCounters {
    /// Set when events have been dropped due to a full queue
    overflow: AtomicBool,
    /// Total count of dropped events
    dropped: AtomicU64,
}

/// Try to send an event (or error) to the application via try_send.
///
/// If the channel is full, drop the item, set the overflow flag, and
/// increment the dropped counter. Before each dispatch, check the overflow
/// flag and attempt to deliver a QueueFull error notification first.
/// Returns false once the receiver is gone.
fn dispatch_event(
    event_tx: &mpsc::Sender<EventItem>,
    counters: &EventCounters,
    item: EventItem,
) -> bool {
    if counters
        .overflow
        .load(Ordering::Relaxed)
    {
        match event_tx.try_send(Err(EslError::QueueFull)) {
            Ok(()) => {
                counters
                    .overflow
                    .store(false, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(_)) => {}
        }
    }

    match event_tx.try_send(item) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Closed(_)) => false,
        Err(mpsc::error::TrySendError::Full(_)) => {
            counters
                .overflow
                .store(true, Ordering::Relaxed);
            counters
                .dropped
                .fetch_add(1, Ordering::Relaxed);
            warn!("Event queue full, dropping event");
            true
        }
    }
}

/// Cloneable handle to a running connection task.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    requests: mpsc::UnboundedSender<Request>,
    status_rx: watch::Receiver<SessionStatus>,
    counters: Arc<EventCounters>,
    ids: Arc<dyn IdGenerator>,
}

impl ConnectionHandle {
    /// Queue `command` behind everything submitted before it.
    pub(crate) fn submit(&self, mut command: Command) -> PendingReply {
        command.set_token_if_absent(|| {
            self.ids
                .next_id()
        });
        let token = command
            .token()
            .map(str::to_string);
        let (reply_tx, rx) = oneshot::channel();
        if self
            .requests
            .send(Request::Send { command, reply_tx })
            .is_err()
        {
            debug!("Connection task gone, command not sent");
        }
        PendingReply::new(token, rx)
    }

    pub(crate) fn submit_esl(&self, command: EslCommand) -> PendingReply {
        match command.to_command() {
            Ok(command) => self.submit(command),
            Err(e) => PendingReply::failed(e),
        }
    }

    pub(crate) fn handshake(&self) -> PendingReply {
        let (reply_tx, rx) = oneshot::channel();
        let _ = self
            .requests
            .send(Request::Handshake { reply_tx });
        PendingReply::new(None, rx)
    }

    pub(crate) fn retry_auth(&self, password: String) {
        let _ = self
            .requests
            .send(Request::RetryAuth { password });
    }

    pub(crate) fn disconnect(&self) {
        info!("Client requested disconnect");
        let _ = self
            .requests
            .send(Request::Disconnect);
    }

    pub(crate) fn status(&self) -> SessionStatus {
        self.status_rx
            .borrow()
            .clone()
    }

    pub(crate) fn status_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx
            .clone()
    }

    pub(crate) fn dropped_event_count(&self) -> u64 {
        self.counters
            .dropped
            .load(Ordering::Relaxed)
    }
}

/// Split `stream` and start its connection task in state `Connected`.
pub(crate) fn spawn_connection<S>(
    stream: S,
    role: Role,
    options: SessionOptions,
) -> (ConnectionHandle, EventStream)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let queue_size = options
        .event_queue_size
        .max(1);
    let (reader, writer) = tokio::io::split(stream);
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(SessionStatus::connected());
    let (event_tx, event_rx) = mpsc::channel(queue_size);
    let counters = Arc::new(EventCounters::default());

    let connection = Connection {
        reader,
        writer,
        decoder: FrameDecoder::new(options.decoder),
        encoder: FrameEncoder,
        correlator: CommandCorrelator::new(),
        requests: requests_rx,
        status_tx: status_tx.clone(),
        event_tx,
        counters: counters.clone(),
        registry: options.registry,
        policy: options.violation_policy,
        role,
        handshake_tx: None,
    };
    tokio::spawn(connection_task(connection, status_tx));

    let handle = ConnectionHandle {
        requests: requests_tx,
        status_rx: status_rx.clone(),
        counters,
        ids: options.id_generator,
    };
    (handle, EventStream::new(event_rx, status_rx))
}

async fn connection_task<S>(connection: Connection<S>, status_tx: watch::Sender<SessionStatus>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let result = std::panic::AssertUnwindSafe(connection.run());
    if futures_util::FutureExt::catch_unwind(result)
        .await
        .is_err()
    {
        tracing::error!("connection task panicked");
        status_tx.send_modify(|status| {
            status.state = SessionState::Disconnected;
            status.disconnect_reason = Some(DisconnectReason::IoError(
                "connection task panicked".to_string(),
            ));
        });
    }
}

enum Step {
    Read(std::io::Result<usize>),
    Request(Option<Request>),
}

struct Connection<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    decoder: FrameDecoder,
    encoder: FrameEncoder,
    correlator: CommandCorrelator,
    requests: mpsc::UnboundedReceiver<Request>,
    status_tx: watch::Sender<SessionStatus>,
    event_tx: mpsc::Sender<EventItem>,
    counters: Arc<EventCounters>,
    registry: EventRegistry,
    policy: ViolationPolicy,
    role: Role,
    handshake_tx: Option<oneshot::Sender<EslResult<Reply>>>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn run(mut self) {
        let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];

        let reason = loop {
            // Frames already buffered go first so replies are matched in
            // arrival order before anything new is read or sent.
            if let Some(reason) = self
                .drain_frames()
                .await
            {
                break reason;
            }

            // Inbound first: bytes already on the wire are decoded before
            // new commands are queued behind them.
            let step = tokio::select! {
                biased;
                read = self.reader.read(&mut read_buffer) => Step::Read(read),
                request = self.requests.recv() => Step::Request(request),
            };

            match step {
                Step::Read(Ok(0)) => {
                    info!("Connection closed (EOF)");
                    break DisconnectReason::ConnectionClosed;
                }
                Step::Read(Ok(n)) => {
                    trace!("[RECV] Read {} bytes from socket", n);
                    if let Err(e) = self
                        .decoder
                        .feed(&read_buffer[..n])
                    {
                        if let Some(reason) = self.handle_error(e) {
                            break reason;
                        }
                    }
                }
                Step::Read(Err(e)) => {
                    if let Some(reason) = self.handle_error(EslError::Io(e)) {
                        break reason;
                    }
                }
                Step::Request(Some(request)) => {
                    if let Some(reason) = self
                        .handle_request(request)
                        .await
                    {
                        break reason;
                    }
                }
                Step::Request(None) => {
                    debug!("All session handles dropped");
                    break DisconnectReason::ClientRequested;
                }
            }
        };

        self.close(reason)
            .await;
    }

    async fn drain_frames(&mut self) -> Option<DisconnectReason> {
        loop {
            match self
                .decoder
                .decode()
            {
                Ok(Some(frame)) => {
                    if let Some(reason) = self
                        .handle_frame(frame)
                        .await
                    {
                        return Some(reason);
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    if let Some(reason) = self.handle_error(e) {
                        return Some(reason);
                    }
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Option<DisconnectReason> {
        let Some(content_type) = frame.content_type() else {
            debug!("Ignoring frame without Content-Type");
            return None;
        };
        trace!("[RECV] {:?} frame", content_type);

        match content_type {
            ContentType::AuthRequest => {
                self.on_auth_request()
                    .await
            }
            ContentType::CommandReply | ContentType::ApiResponse => {
                match self
                    .correlator
                    .on_reply(frame)
                {
                    Ok(Some((kind, reply))) => {
                        self.on_internal_reply(kind, reply);
                        None
                    }
                    Ok(None) => None,
                    Err(e) => self.handle_error(e),
                }
            }
            ContentType::EventPlain
            | ContentType::EventJson
            | ContentType::EventXml
            | ContentType::LogData => {
                let classified = self
                    .registry
                    .classify_frame(frame);
                if !dispatch_event(&self.event_tx, &self.counters, Ok(classified)) {
                    trace!("Event stream dropped, discarding event");
                }
                None
            }
            ContentType::DisconnectNotice => {
                if frame.header(HEADER_CONTENT_DISPOSITION) == Some("linger") {
                    debug!("Received disconnect notice with linger disposition, ignoring");
                    return None;
                }
                info!("Received disconnect notice from server");
                Some(DisconnectReason::ServerNotice)
            }
            ContentType::RudeRejection => {
                warn!(
                    "Connection rejected by server: {}",
                    frame
                        .body()
                        .unwrap_or_default()
                        .trim()
                );
                Some(DisconnectReason::Rejected)
            }
            ContentType::Unknown(other) => {
                debug!("Ignoring frame with unknown Content-Type {}", other);
                None
            }
        }
    }

    /// Single decision point for every failure on this connection.
    ///
    /// Returns the disconnect reason when the connection must close.
    fn handle_error(&mut self, error: EslError) -> Option<DisconnectReason> {
        match error {
            EslError::ProtocolViolation { message } => match self.policy {
                ViolationPolicy::Fatal => {
                    warn!("Protocol violation, closing: {}", message);
                    Some(DisconnectReason::ProtocolError(message))
                }
                ViolationPolicy::LogAndDrop => {
                    warn!("Protocol violation, dropped: {}", message);
                    None
                }
            },
            EslError::Io(e) => {
                warn!("I/O error: {}", e);
                Some(DisconnectReason::IoError(e.to_string()))
            }
            EslError::ConnectionClosed => Some(DisconnectReason::ConnectionClosed),
            other => {
                warn!("Fatal decode error: {}", other);
                Some(DisconnectReason::ProtocolError(other.to_string()))
            }
        }
    }

    async fn handle_request(&mut self, request: Request) -> Option<DisconnectReason> {
        match request {
            Request::Send { command, reply_tx } => {
                self.send(command, Completion::Caller(reply_tx))
                    .await
            }
            Request::RetryAuth { password } => {
                let Role::DialOut { password: current } = &mut self.role else {
                    debug!("Ignoring auth retry on a listen-in connection");
                    return None;
                };
                *current = password;
                if self
                    .status_tx
                    .borrow()
                    .state
                    != SessionState::Connected
                {
                    debug!("Auth retry ignored, not waiting for authentication");
                    return None;
                }
                self.send_auth()
                    .await
            }
            Request::Handshake { reply_tx } => {
                self.handshake_tx = Some(reply_tx);
                self.set_state(SessionState::Authenticating);
                self.send(
                    Command::new("connect", ""),
                    Completion::Internal(InternalCommand::Connect),
                )
                .await
            }
            Request::Disconnect => Some(DisconnectReason::ClientRequested),
        }
    }

    async fn send(&mut self, command: Command, completion: Completion) -> Option<DisconnectReason> {
        match self
            .correlator
            .send(&mut self.writer, &self.encoder, command, completion)
            .await
        {
            Ok(()) => None,
            Err(e) => self.handle_error(e),
        }
    }

    async fn on_auth_request(&mut self) -> Option<DisconnectReason> {
        if !matches!(self.role, Role::DialOut { .. }) {
            debug!("Ignoring auth/request on a listen-in connection");
            return None;
        }
        if self
            .status_tx
            .borrow()
            .state
            != SessionState::Connected
        {
            debug!("Ignoring repeated auth/request");
            return None;
        }
        self.send_auth()
            .await
    }

    async fn send_auth(&mut self) -> Option<DisconnectReason> {
        let Role::DialOut { password } = &self.role else {
            return None;
        };
        let command = match (EslCommand::Auth {
            password: password.clone(),
        })
        .to_command()
        {
            Ok(command) => command,
            Err(e) => {
                warn!("Cannot authenticate: {}", e);
                self.status_tx
                    .send_modify(|status| status.auth_error = Some(e.to_string()));
                return None;
            }
        };
        self.status_tx
            .send_modify(|status| status.auth_error = None);
        self.set_state(SessionState::Authenticating);
        self.send(command, Completion::Internal(InternalCommand::Auth))
            .await
    }

    fn on_internal_reply(&mut self, kind: InternalCommand, reply: Reply) {
        let accepted = reply.is_ok();
        match kind {
            InternalCommand::Auth if accepted => {
                info!("Authentication successful");
            }
            InternalCommand::Auth => {
                warn!("Authentication failed: {}", reply.text());
            }
            InternalCommand::Connect if accepted => {
                info!("Listen-in session established");
            }
            InternalCommand::Connect => {
                warn!("Connect rejected: {}", reply.text());
            }
        }

        if accepted {
            self.set_state(SessionState::Ready);
        } else {
            let reason = reply
                .text()
                .to_string();
            self.status_tx
                .send_modify(|status| {
                    status.state = SessionState::Connected;
                    status.auth_error = Some(reason);
                });
        }

        if kind == InternalCommand::Connect {
            if let Some(tx) = self
                .handshake_tx
                .take()
            {
                let _ = tx.send(Ok(reply));
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self
            .status_tx
            .borrow()
            .state;
        if previous != state {
            debug!("Session state {} -> {}", previous, state);
        }
        self.status_tx
            .send_modify(|status| status.state = state);
    }

    async fn close(mut self, reason: DisconnectReason) {
        self.set_state(SessionState::Closing);

        self.correlator
            .on_close();
        self.requests
            .close();
        while let Ok(request) = self
            .requests
            .try_recv()
        {
            match request {
                Request::Send { reply_tx, .. } | Request::Handshake { reply_tx } => {
                    let _ = reply_tx.send(Err(EslError::ConnectionClosed));
                }
                Request::RetryAuth { .. } | Request::Disconnect => {}
            }
        }
        if let Some(tx) = self
            .handshake_tx
            .take()
        {
            let _ = tx.send(Err(EslError::ConnectionClosed));
        }

        if let Err(e) = self
            .writer
            .shutdown()
            .await
        {
            debug!("Shutdown after close: {}", e);
        }

        info!("Session closed: {}", reason);
        self.status_tx
            .send_modify(|status| {
                status.state = SessionState::Disconnected;
                status.disconnect_reason = Some(reason);
            });
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted switch on the far end of a `tokio::io::duplex` pipe.

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    pub(crate) struct FakeSwitch {
        stream: DuplexStream,
        pending: Vec<u8>,
    }

    impl FakeSwitch {
        pub(crate) fn new(stream: DuplexStream) -> Self {
            Self {
                stream,
                pending: Vec::new(),
            }
        }

        pub(crate) fn pair() -> (DuplexStream, Self) {
            let (client, server) = tokio::io::duplex(64 * 1024);
            (client, Self::new(server))
        }

        pub(crate) async fn send(&mut self, wire: &str) {
            self.stream
                .write_all(wire.as_bytes())
                .await
                .unwrap();
        }

        pub(crate) async fn reply_ok(&mut self) {
            self.send("Content-Type: command/reply\nReply-Text: +OK\n\n")
                .await;
        }

        pub(crate) async fn reply(&mut self, reply_text: &str) {
            self.send(&format!(
                "Content-Type: command/reply\nReply-Text: {}\n\n",
                reply_text
            ))
            .await;
        }

        /// Next command block, without its blank-line terminator.
        pub(crate) async fn expect_command(&mut self) -> String {
            loop {
                if let Some(end) = self
                    .pending
                    .windows(2)
                    .position(|w| w == b"\n\n")
                {
                    let block: Vec<u8> = self
                        .pending
                        .drain(..end + 2)
                        .collect();
                    return String::from_utf8(block[..end].to_vec()).unwrap();
                }
                let mut chunk = [0u8; 1024];
                let n = self
                    .stream
                    .read(&mut chunk)
                    .await
                    .unwrap();
                assert!(n > 0, "client closed while a command was expected");
                self.pending
                    .extend_from_slice(&chunk[..n]);
            }
        }

        /// Read until the client closes its side.
        pub(crate) async fn expect_eof(&mut self) {
            let mut chunk = [0u8; 1024];
            loop {
                let n = self
                    .stream
                    .read(&mut chunk)
                    .await
                    .unwrap();
                if n == 0 {
                    return;
                }
                self.pending
                    .extend_from_slice(&chunk[..n]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeSwitch;
    use super::*;
    use crate::event::Classified;

    async fn wait_for_state(handle: &ConnectionHandle, state: SessionState) -> SessionStatus {
        let mut rx = handle.status_receiver();
        loop {
            {
                let status = rx.borrow_and_update();
                if status.state == state {
                    return status.clone();
                }
            }
            rx.changed()
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_dispatch_event_overflow() {
        let (tx, mut rx) = mpsc::channel(1);
        let counters = EventCounters::default();
        let event = || {
            Ok(EventRegistry::default().classify_frame(Frame::from_parts(
                &[("Content-Type", "text/event-plain")],
                &["Event-Name: HEARTBEAT"],
            )))
        };

        assert!(dispatch_event(&tx, &counters, event()));
        assert!(dispatch_event(&tx, &counters, event()));
        assert_eq!(counters.dropped.load(Ordering::Relaxed), 1);

        assert!(matches!(rx.recv().await, Some(Ok(Classified::Typed(_)))));
        assert!(dispatch_event(&tx, &counters, event()));
        assert!(matches!(rx.recv().await, Some(Err(EslError::QueueFull))));

        drop(rx);
        assert!(!dispatch_event(&tx, &counters, event()));
    }

    #[tokio::test]
    async fn test_events_and_replies_are_routed() {
        let (client, mut switch) = FakeSwitch::pair();
        let (handle, mut events) = spawn_connection(client, Role::ListenIn, SessionOptions::listen_in());

        let pending = handle.submit(Command::new("api", "status"));
        assert_eq!(switch.expect_command().await, "api status");
        switch
            .send("Content-Type: text/event-plain\nContent-Length: 22\n\nEvent-Name: HEARTBEAT\n")
            .await;
        switch
            .send("Content-Type: api/response\nContent-Length: 3\n\nUP\n")
            .await;

        let reply = pending
            .await
            .unwrap();
        assert_eq!(reply.text(), "UP\n");
        assert!(matches!(events.recv().await, Some(Ok(Classified::Typed(_)))));
    }

    #[tokio::test]
    async fn test_stray_reply_dropped_under_log_and_drop() {
        let (client, mut switch) = FakeSwitch::pair();
        let (handle, _events) = spawn_connection(client, Role::ListenIn, SessionOptions::listen_in());

        switch
            .reply("-ERR nobody asked")
            .await;
        let pending = handle.submit(Command::new("resume", ""));
        assert_eq!(switch.expect_command().await, "resume");
        switch
            .reply_ok()
            .await;
        let reply = pending
            .await
            .unwrap();
        assert_eq!(reply.text(), "+OK");
        assert!(handle
            .status()
            .is_connected());
    }

    #[tokio::test]
    async fn test_stray_reply_fatal_under_strict_policy() {
        let (client, mut switch) = FakeSwitch::pair();
        let (handle, mut events) = spawn_connection(
            client,
            Role::DialOut {
                password: "ClueCon".into(),
            },
            SessionOptions::dial_out(),
        );

        switch
            .reply("+OK nobody asked")
            .await;
        let status = wait_for_state(&handle, SessionState::Disconnected).await;
        assert!(matches!(
            status.disconnect_reason,
            Some(DisconnectReason::ProtocolError(_))
        ));
        assert!(events
            .recv()
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_close_resolves_pending_commands() {
        let (client, mut switch) = FakeSwitch::pair();
        let (handle, _events) = spawn_connection(client, Role::ListenIn, SessionOptions::listen_in());

        let first = handle.submit(Command::new("api", "one"));
        let second = handle.submit(Command::new("api", "two"));
        assert_eq!(switch.expect_command().await, "api one");
        assert_eq!(switch.expect_command().await, "api two");
        drop(switch);

        assert!(matches!(first.await, Err(EslError::ConnectionClosed)));
        assert!(matches!(second.await, Err(EslError::ConnectionClosed)));
        let status = wait_for_state(&handle, SessionState::Disconnected).await;
        assert_eq!(
            status.disconnect_reason,
            Some(DisconnectReason::ConnectionClosed)
        );

        // Submitting after close resolves immediately.
        assert!(matches!(
            handle
                .submit(Command::new("api", "late"))
                .await,
            Err(EslError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_frame_too_long_closes() {
        let (client, mut switch) = FakeSwitch::pair();
        let mut options = SessionOptions::listen_in();
        options
            .decoder
            .max_line_length = 32;
        let (handle, _events) = spawn_connection(client, Role::ListenIn, options);

        switch
            .send(&format!("X-Long: {}\n\n", "a".repeat(64)))
            .await;
        let status = wait_for_state(&handle, SessionState::Disconnected).await;
        assert!(matches!(
            status.disconnect_reason,
            Some(DisconnectReason::ProtocolError(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_notice_linger_ignored() {
        let (client, mut switch) = FakeSwitch::pair();
        let (handle, _events) = spawn_connection(client, Role::ListenIn, SessionOptions::listen_in());

        switch
            .send("Content-Type: text/disconnect-notice\nContent-Disposition: linger\nContent-Length: 0\n\n")
            .await;
        let pending = handle.submit(Command::new("exit", ""));
        assert_eq!(switch.expect_command().await, "exit");
        switch
            .reply_ok()
            .await;
        assert!(pending
            .await
            .is_ok());

        switch
            .send("Content-Type: text/disconnect-notice\nContent-Length: 0\n\n")
            .await;
        let status = wait_for_state(&handle, SessionState::Disconnected).await;
        assert_eq!(status.disconnect_reason, Some(DisconnectReason::ServerNotice));
        switch
            .expect_eof()
            .await;
    }

    #[tokio::test]
    async fn test_handshake_sets_ready() {
        let (client, mut switch) = FakeSwitch::pair();
        let (handle, _events) = spawn_connection(client, Role::ListenIn, SessionOptions::listen_in());

        let pending = handle.handshake();
        assert_eq!(switch.expect_command().await, "connect");
        switch
            .send("Content-Type: command/reply\nReply-Text: +OK\nUnique-ID: abc\n\n")
            .await;
        let reply = pending
            .await
            .unwrap();
        assert_eq!(reply.frame().header("Unique-ID"), Some("abc"));
        assert!(handle
            .status()
            .is_ready());
    }
}
