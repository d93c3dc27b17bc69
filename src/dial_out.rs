//! Dial-out sessions: we connect to the switch and authenticate.

use crate::{
    command::{Command, EslCommand},
    connection::{spawn_connection, ConnectionHandle, Role},
    constants::{DEFAULT_ESL_PORT, DEFAULT_TIMEOUT_MS},
    error::{EslError, EslResult},
    event::{EslEventType, EventFormat},
    session::{EventStream, PendingReply, SessionOptions, SessionState, SessionStatus},
};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, info, warn};

/// Where and how to connect.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialOutConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// TCP connect timeout in milliseconds. Default: 2000.
    pub connect_timeout_ms: u64,
    pub options: SessionOptions,
}

impl DialOutConfig {
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            ..Self::default()
        }
    }
}

impl Default for DialOutConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_ESL_PORT,
            password: "ClueCon".to_string(),
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            options: SessionOptions::dial_out(),
        }
    }
}

impl fmt::Debug for DialOutConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialOutConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"[REDACTED]")
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("options", &self.options)
            .finish()
    }
}

/// Establish a TCP connection with a timeout.
async fn tcp_connect_with_timeout(host: &str, port: u16, timeout_ms: u64) -> EslResult<TcpStream> {
    match timeout(
        Duration::from_millis(timeout_ms),
        TcpStream::connect((host, port)),
    )
    .await
    {
        Ok(Ok(s)) => {
            debug!("[CONNECT] TCP connection established");
            Ok(s)
        }
        Ok(Err(e)) => {
            warn!("[CONNECT] TCP connect failed: {}", e);
            Err(EslError::Io(e))
        }
        Err(_) => {
            warn!("[CONNECT] TCP connect timed out after {}ms", timeout_ms);
            Err(EslError::Timeout { timeout_ms })
        }
    }
}

/// Handle to a dial-out connection (Clone + Send + Sync).
///
/// Authentication happens on the connection task as soon as the switch asks
/// for it. Until the session is [`Ready`](SessionState::Ready) every send
/// method returns `None` instead of queuing the command.
#[derive(Clone)]
pub struct DialOutSession {
    handle: ConnectionHandle,
}

impl fmt::Debug for DialOutSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialOutSession")
            .field("state", &self.state())
            .finish()
    }
}

impl DialOutSession {
    /// Connect over TCP and start the session.
    ///
    /// Returns once the socket is up; use [`ready`](Self::ready) to wait for
    /// authentication.
    pub async fn connect(config: DialOutConfig) -> EslResult<(Self, EventStream)> {
        debug!(
            "Session state {} -> {}",
            SessionState::Disconnected,
            SessionState::Connecting
        );
        info!("Connecting to switch at {}:{}", config.host, config.port);
        let stream =
            tcp_connect_with_timeout(&config.host, config.port, config.connect_timeout_ms).await?;
        Ok(Self::from_stream(stream, config.password, config.options))
    }

    /// Run the session over an already-open stream.
    pub fn from_stream<S>(
        stream: S,
        password: impl Into<String>,
        options: SessionOptions,
    ) -> (Self, EventStream)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let role = Role::DialOut {
            password: password.into(),
        };
        let (handle, events) = spawn_connection(stream, role, options);
        (Self { handle }, events)
    }

    /// Wait until authenticated.
    ///
    /// Fails with `AuthFailed` when the switch rejects the password and with
    /// `ConnectionClosed` when the connection ends first.
    pub async fn ready(&self) -> EslResult<()> {
        let mut status_rx = self
            .handle
            .status_receiver();
        loop {
            {
                let status = status_rx.borrow_and_update();
                match status.state {
                    SessionState::Ready => return Ok(()),
                    SessionState::Closing | SessionState::Disconnected => {
                        return Err(EslError::ConnectionClosed)
                    }
                    SessionState::Connected => {
                        if let Some(reason) = &status.auth_error {
                            return Err(EslError::auth_failed(reason.clone()));
                        }
                    }
                    SessionState::Connecting | SessionState::Authenticating => {}
                }
            }
            if status_rx
                .changed()
                .await
                .is_err()
            {
                return Err(EslError::ConnectionClosed);
            }
        }
    }

    /// Try again after a rejected password.
    pub fn retry_auth(&self, password: impl Into<String>) {
        self.handle
            .retry_auth(password.into());
    }

    pub fn status(&self) -> SessionStatus {
        self.handle
            .status()
    }

    pub fn state(&self) -> SessionState {
        self.status()
            .state
    }

    pub fn is_ready(&self) -> bool {
        self.status()
            .is_ready()
    }

    /// Whether the connection is alive (not yet closing or closed).
    pub fn is_connected(&self) -> bool {
        self.status()
            .is_connected()
    }

    /// Number of events dropped due to a full event queue.
    pub fn dropped_event_count(&self) -> u64 {
        self.handle
            .dropped_event_count()
    }

    /// Queue a raw command; `None` unless ready.
    pub fn send_command(&self, command: Command) -> Option<PendingReply> {
        if !self.is_ready() {
            debug!("Not ready, dropping {}", command.log_line());
            return None;
        }
        Some(
            self.handle
                .submit(command),
        )
    }

    /// Queue a catalog command; `None` unless ready.
    ///
    /// Invalid arguments resolve the reply with `InvalidCommand`.
    pub fn send(&self, command: EslCommand) -> Option<PendingReply> {
        if !self.is_ready() {
            debug!("Not ready, dropping {:?}", command);
            return None;
        }
        Some(
            self.handle
                .submit_esl(command),
        )
    }

    /// Execute API command (blocking on the switch side)
    ///
    /// ```rust,no_run
    /// # async fn example(session: &esl_engine::DialOutSession) -> Result<(), esl_engine::EslError> {
    /// if let Some(reply) = session.api("status") {
    ///     println!("{}", reply.await?.text());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn api(&self, command: &str) -> Option<PendingReply> {
        self.send(EslCommand::Api {
            command: command.to_string(),
        })
    }

    /// Background API; the reply carries `Job-UUID`, the result arrives as a
    /// `BACKGROUND_JOB` event.
    pub fn bgapi(&self, command: &str) -> Option<PendingReply> {
        self.send(EslCommand::BgApi {
            command: command.to_string(),
        })
    }

    pub fn subscribe_events(
        &self,
        format: EventFormat,
        events: &[EslEventType],
    ) -> Option<PendingReply> {
        self.send(EslCommand::Events {
            format,
            events: events.to_vec(),
        })
    }

    pub fn filter(&self, header: &str, value: &str) -> Option<PendingReply> {
        self.send(EslCommand::Filter {
            header: header.to_string(),
            value: value.to_string(),
        })
    }

    /// Run an application on channel `uuid` through `sendmsg`.
    pub fn execute(&self, app: &str, args: Option<&str>, uuid: &str) -> Option<PendingReply> {
        self.send(EslCommand::Execute {
            app: app.to_string(),
            args: args.map(str::to_string),
            uuid: Some(uuid.to_string()),
        })
    }

    /// Ask the switch to close the session.
    pub fn exit(&self) -> Option<PendingReply> {
        self.send(EslCommand::Exit)
    }

    /// Close from our side; pending commands fail with `ConnectionClosed`.
    pub fn disconnect(&self) {
        self.handle
            .disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        connection::testing::FakeSwitch,
        event::{Classified, TypedEvent},
        id::SequentialIdGenerator,
        session::DisconnectReason,
    };
    use std::sync::Arc;

    async fn authenticated() -> (DialOutSession, EventStream, FakeSwitch) {
        let (client, mut switch) = FakeSwitch::pair();
        let (session, events) =
            DialOutSession::from_stream(client, "ClueCon", SessionOptions::dial_out());
        switch
            .send("Content-Type: auth/request\n\n")
            .await;
        assert_eq!(switch.expect_command().await, "auth ClueCon");
        switch
            .reply("+OK accepted")
            .await;
        session
            .ready()
            .await
            .unwrap();
        (session, events, switch)
    }

    #[tokio::test]
    async fn test_sends_refused_before_ready() {
        let (client, _switch) = FakeSwitch::pair();
        let (session, _events) =
            DialOutSession::from_stream(client, "ClueCon", SessionOptions::dial_out());
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session
            .api("status")
            .is_none());
        assert!(session
            .send_command(Command::new("api", "status"))
            .is_none());
        assert!(session
            .exit()
            .is_none());
    }

    #[tokio::test]
    async fn test_auto_auth_reaches_ready() {
        let (session, _events, _switch) = authenticated().await;
        assert!(session.is_ready());
        assert_eq!(
            session
                .status()
                .auth_error,
            None
        );
    }

    #[tokio::test]
    async fn test_auth_failure_never_ready() {
        let (client, mut switch) = FakeSwitch::pair();
        let (session, _events) =
            DialOutSession::from_stream(client, "wrong", SessionOptions::dial_out());
        switch
            .send("Content-Type: auth/request\n\n")
            .await;
        assert_eq!(switch.expect_command().await, "auth wrong");
        switch
            .reply("-ERR invalid")
            .await;

        let err = session
            .ready()
            .await
            .unwrap_err();
        assert!(matches!(err, EslError::AuthFailed { ref reason } if reason == "-ERR invalid"));
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session
            .api("status")
            .is_none());

        session.retry_auth("ClueCon");
        assert_eq!(switch.expect_command().await, "auth ClueCon");
        switch
            .reply("+OK accepted")
            .await;
        session
            .ready()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fifo_over_the_wire() {
        let (session, _events, mut switch) = authenticated().await;

        let c1 = session
            .api("one")
            .unwrap();
        let c2 = session
            .bgapi("two")
            .unwrap();
        let c3 = session
            .filter("Event-Name", "HEARTBEAT")
            .unwrap();
        assert_eq!(switch.expect_command().await, "api one");
        assert_eq!(switch.expect_command().await, "bgapi two");
        assert_eq!(switch.expect_command().await, "filter Event-Name HEARTBEAT");

        switch
            .send("Content-Type: api/response\nContent-Length: 5\n\nR1-ok")
            .await;
        switch
            .send("Content-Type: command/reply\nReply-Text: +OK Job-UUID: j2\nJob-UUID: j2\n\n")
            .await;
        switch
            .reply("+OK filter added")
            .await;

        let (r3, r1, r2) = tokio::join!(c3, c1, c2);
        assert_eq!(
            r1.unwrap()
                .text(),
            "R1-ok"
        );
        assert_eq!(
            r2.unwrap()
                .as_command()
                .and_then(|r| r.job_uuid()),
            Some("j2")
        );
        assert_eq!(
            r3.unwrap()
                .text(),
            "+OK filter added"
        );
    }

    #[tokio::test]
    async fn test_tokens_from_injected_generator() {
        let (client, mut switch) = FakeSwitch::pair();
        let options =
            SessionOptions::dial_out().with_id_generator(Arc::new(SequentialIdGenerator::new("t")));
        let (session, _events) = DialOutSession::from_stream(client, "ClueCon", options);
        switch
            .send("Content-Type: auth/request\n\n")
            .await;
        switch
            .expect_command()
            .await;
        switch
            .reply_ok()
            .await;
        session
            .ready()
            .await
            .unwrap();

        let first = session
            .api("status")
            .unwrap();
        let second = session
            .send_command(Command::new("api", "version").with_token("mine"))
            .unwrap();
        assert_eq!(first.token(), Some("t-1"));
        assert_eq!(second.token(), Some("mine"));
    }

    #[tokio::test]
    async fn test_invalid_command_rejected() {
        let (session, _events, _switch) = authenticated().await;
        let reply = session
            .api("status\n\nexit")
            .unwrap();
        assert!(matches!(
            reply.await,
            Err(EslError::InvalidCommand { .. })
        ));
    }

    #[tokio::test]
    async fn test_events_delivered_classified() {
        let (session, mut events, mut switch) = authenticated().await;
        let subscribed = session
            .subscribe_events(
                EventFormat::Plain,
                &[EslEventType::BackgroundJob, EslEventType::Heartbeat],
            )
            .unwrap();
        assert_eq!(
            switch.expect_command().await,
            "event plain BACKGROUND_JOB HEARTBEAT"
        );
        switch
            .reply("+OK event listener enabled plain")
            .await;
        assert!(subscribed
            .await
            .unwrap()
            .is_ok());

        let body = "Event-Name: BACKGROUND_JOB\nJob-UUID: b317e530\nContent-Length: 4\n\n+OK\n";
        switch
            .send(&format!(
                "Content-Type: text/event-plain\nContent-Length: {}\n\n{}",
                body.len(),
                body
            ))
            .await;
        let body = "Event-Name: SOMETHING_ELSE\n";
        switch
            .send(&format!(
                "Content-Type: text/event-plain\nContent-Length: {}\n\n{}",
                body.len(),
                body
            ))
            .await;

        match events.recv().await {
            Some(Ok(Classified::Typed(TypedEvent::BackgroundJob(job)))) => {
                assert_eq!(job.job_uuid().as_deref(), Some("b317e530"));
                assert_eq!(job.result().as_deref(), Some("+OK\n"));
            }
            other => panic!("expected BackgroundJob, got {:?}", other),
        }
        assert!(matches!(
            events.recv().await,
            Some(Ok(Classified::Unhandled(_)))
        ));
    }

    #[tokio::test]
    async fn test_rude_rejection_closes() {
        let (client, mut switch) = FakeSwitch::pair();
        let (session, mut events) =
            DialOutSession::from_stream(client, "ClueCon", SessionOptions::dial_out());
        switch
            .send("Content-Type: text/rude-rejection\nContent-Length: 22\n\nAccess Denied, go away")
            .await;

        assert!(events
            .recv()
            .await
            .is_none());
        assert!(matches!(
            session
                .ready()
                .await,
            Err(EslError::ConnectionClosed)
        ));
        assert_eq!(
            session
                .status()
                .disconnect_reason,
            Some(DisconnectReason::Rejected)
        );
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending() {
        let (session, mut events, mut switch) = authenticated().await;
        let pending = session
            .api("status")
            .unwrap();
        assert_eq!(switch.expect_command().await, "api status");
        session.disconnect();

        assert!(matches!(pending.await, Err(EslError::ConnectionClosed)));
        assert!(events
            .recv()
            .await
            .is_none());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session
            .api("status")
            .is_none());
        switch
            .expect_eof()
            .await;
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let config = DialOutConfig::new("pbx.example.com", 8021, "s3cret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("pbx.example.com"));
    }

    #[test]
    fn test_config_from_json() {
        let config: DialOutConfig =
            serde_json::from_str(r#"{"host": "10.0.0.5", "password": "pw"}"#).unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, DEFAULT_ESL_PORT);
        assert_eq!(config.connect_timeout_ms, DEFAULT_TIMEOUT_MS);
    }
}
