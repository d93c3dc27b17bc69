//! Sessions over real loopback TCP, with the test playing the switch.

use esl_engine::{
    CallHandler, Classified, DialOutConfig, DialOutSession, DisconnectReason, EslError, EslEvent,
    EslListener, EslResult, ListenInOptions, ListenInSession, SessionState, TypedEvent,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// `RUST_LOG=esl_engine=trace cargo test --test sessions` shows the wire.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted switch side of a TCP connection.
struct Switch {
    stream: TcpStream,
    pending: Vec<u8>,
}

impl Switch {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            pending: Vec::new(),
        }
    }

    async fn send(&mut self, wire: &str) {
        self.stream
            .write_all(wire.as_bytes())
            .await
            .unwrap();
    }

    async fn reply(&mut self, reply_text: &str) {
        self.send(&format!(
            "Content-Type: command/reply\nReply-Text: {}\n\n",
            reply_text
        ))
        .await;
    }

    async fn expect_command(&mut self) -> String {
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
            let n = tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut chunk))
                .await
                .expect("timed out waiting for a command")
                .unwrap();
            assert!(n > 0, "client closed while a command was expected");
            self.pending
                .extend_from_slice(&chunk[..n]);
        }
    }
}

async fn dial_out_pair() -> (DialOutSession, esl_engine::EventStream, Switch) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener
        .local_addr()
        .unwrap()
        .port();

    let config = DialOutConfig::new("127.0.0.1", port, "ClueCon");
    let (connected, accepted) = tokio::join!(DialOutSession::connect(config), listener.accept());
    let (session, events) = connected.unwrap();
    let (stream, _) = accepted.unwrap();
    (session, events, Switch::new(stream))
}

#[tokio::test]
async fn dial_out_authenticates_and_correlates_in_order() {
    init_tracing();
    let (session, _events, mut switch) = dial_out_pair().await;
    assert!(session
        .api("status")
        .is_none());

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

    let first = session
        .api("status")
        .unwrap();
    let second = session
        .api("version")
        .unwrap();
    assert_eq!(switch.expect_command().await, "api status");
    assert_eq!(switch.expect_command().await, "api version");

    // Split across writes mid-header and mid-body.
    switch
        .send("Content-Type: api/resp")
        .await;
    switch
        .send("onse\nContent-Length: 10\n\nUP 0 ye")
        .await;
    switch
        .send("ars\nContent-Type: api/response\nContent-Length: 7\n\n1.10.11")
        .await;

    let (second, first) = tokio::join!(second, first);
    assert_eq!(
        first
            .unwrap()
            .text(),
        "UP 0 years"
    );
    assert_eq!(
        second
            .unwrap()
            .text(),
        "1.10.11"
    );
}

#[tokio::test]
async fn dial_out_auth_rejected_then_retried() {
    init_tracing();
    let (session, _events, mut switch) = dial_out_pair().await;

    switch
        .send("Content-Type: auth/request\n\n")
        .await;
    switch
        .expect_command()
        .await;
    switch
        .reply("-ERR invalid")
        .await;
    assert!(matches!(
        session
            .ready()
            .await,
        Err(EslError::AuthFailed { .. })
    ));
    assert_ne!(session.state(), SessionState::Ready);

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
async fn dial_out_stray_reply_closes_strict_session() {
    init_tracing();
    let (session, mut events, mut switch) = dial_out_pair().await;

    switch
        .reply("+OK nobody asked")
        .await;
    assert!(events
        .recv()
        .await
        .is_none());
    assert!(matches!(
        session
            .status()
            .disconnect_reason,
        Some(DisconnectReason::ProtocolError(_))
    ));
    assert!(session
        .api("status")
        .is_none());
}

#[tokio::test]
async fn dial_out_server_disconnect_ends_stream() {
    init_tracing();
    let (session, mut events, mut switch) = dial_out_pair().await;
    switch
        .send("Content-Type: auth/request\n\n")
        .await;
    switch
        .expect_command()
        .await;
    switch
        .reply("+OK accepted")
        .await;
    session
        .ready()
        .await
        .unwrap();

    let pending = session
        .api("status")
        .unwrap();
    switch
        .expect_command()
        .await;
    switch
        .send("Content-Type: text/disconnect-notice\nContent-Length: 0\n\n")
        .await;

    assert!(matches!(pending.await, Err(EslError::ConnectionClosed)));
    assert!(events
        .recv()
        .await
        .is_none());
    assert_eq!(
        session
            .status()
            .disconnect_reason,
        Some(DisconnectReason::ServerNotice)
    );
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl Recorder {
    fn record(&self, call: impl Into<String>) {
        self.calls
            .lock()
            .unwrap()
            .push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .clone()
    }
}

impl CallHandler for Recorder {
    async fn pre_handle(&self, _session: &ListenInSession) -> EslResult<()> {
        self.record("pre_handle");
        Ok(())
    }

    async fn handle(&self, session: &ListenInSession) -> EslResult<()> {
        self.record("handle");
        session
            .hangup(Some("NORMAL_CLEARING"))
            .await?
            .into_result()?;
        Ok(())
    }

    async fn handle_event(&self, _session: &ListenInSession, event: TypedEvent) {
        self.record(format!("event:{}", event.event_type()));
    }

    async fn handle_unhandled_event(&self, _session: &ListenInSession, event: EslEvent) {
        self.record(format!(
            "unhandled:{}",
            event
                .event_name()
                .unwrap_or_default()
        ));
    }
}

const CONNECT_REPLY: &str = "Content-Type: command/reply\n\
    Reply-Text: +OK\n\
    Unique-ID: 0f1e2d3c\n\
    Caller-Caller-ID-Number: 1000\n\n";

async fn listen_in_pair() -> (ListenInSession, esl_engine::EventStream, Switch) {
    let listener = EslListener::bind("127.0.0.1:0", ListenInOptions::default())
        .await
        .unwrap();
    let addr = listener
        .local_addr()
        .unwrap();
    let (accepted, dialed) = tokio::join!(listener.accept(), TcpStream::connect(addr));
    let (session, events) = accepted.unwrap();
    (session, events, Switch::new(dialed.unwrap()))
}

#[tokio::test]
async fn listen_in_runs_setup_in_order() {
    init_tracing();
    let (session, events, mut switch) = listen_in_pair().await;
    let handler = Arc::new(Recorder::default());
    let task = tokio::spawn(
        session
            .clone()
            .run(handler.clone(), events),
    );

    assert_eq!(switch.expect_command().await, "connect");
    switch
        .send(CONNECT_REPLY)
        .await;
    for expected in ["resume", "myevents plain", "divert_events on"] {
        assert_eq!(switch.expect_command().await, expected);
        switch
            .reply("+OK")
            .await;
    }
    assert_eq!(
        switch.expect_command().await,
        "sendmsg \ncall-command: execute\nexecute-app-name: answer"
    );
    let body = "Event-Name: CHANNEL_ANSWER\nUnique-ID: 0f1e2d3c\n";
    switch
        .send(&format!(
            "Content-Type: text/event-plain\nContent-Length: {}\n\n{}",
            body.len(),
            body
        ))
        .await;
    switch
        .reply("+OK")
        .await;

    assert_eq!(
        switch.expect_command().await,
        "sendmsg \ncall-command: hangup\nhangup-cause: NORMAL_CLEARING"
    );
    switch
        .reply("+OK")
        .await;
    switch
        .send("Content-Type: text/disconnect-notice\nContent-Length: 0\n\n")
        .await;

    task.await
        .unwrap()
        .unwrap();
    // The event and the answer reply race inside the session; only the
    // setup hooks have a fixed order.
    let calls = handler.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], "pre_handle");
    assert!(calls.contains(&"event:CHANNEL_ANSWER".to_string()));
    assert!(calls.contains(&"handle".to_string()));
    assert_eq!(
        session
            .connection_info()
            .and_then(|i| i
                .caller_id_number
                .clone()),
        Some("1000".to_string())
    );
}

#[tokio::test]
async fn listen_in_aborts_on_failed_step() {
    init_tracing();
    let (session, events, mut switch) = listen_in_pair().await;
    let handler = Arc::new(Recorder::default());
    let task = tokio::spawn(
        session
            .clone()
            .run(handler.clone(), events),
    );

    assert_eq!(switch.expect_command().await, "connect");
    switch
        .send(CONNECT_REPLY)
        .await;
    assert_eq!(switch.expect_command().await, "resume");
    switch
        .reply("-ERR not now")
        .await;

    let err = task
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, EslError::CommandFailed { .. }));
    assert!(handler
        .calls()
        .is_empty());
    assert_eq!(
        session
            .status()
            .disconnect_reason,
        Some(DisconnectReason::ClientRequested)
    );
}

#[tokio::test]
async fn listen_in_stray_reply_is_dropped() {
    init_tracing();
    let (session, mut events, mut switch) = listen_in_pair().await;

    switch
        .reply("+OK nobody asked")
        .await;
    let body = "Event-Name: HEARTBEAT\nCore-UUID: abc\n";
    switch
        .send(&format!(
            "Content-Type: text/event-plain\nContent-Length: {}\n\n{}",
            body.len(),
            body
        ))
        .await;

    match events
        .recv()
        .await
    {
        Some(Ok(Classified::Typed(TypedEvent::Heartbeat(heartbeat)))) => {
            assert_eq!(heartbeat.core_uuid().as_deref(), Some("abc"));
        }
        other => panic!("expected heartbeat, got {:?}", other),
    }
    assert!(session
        .status()
        .is_connected());
}
