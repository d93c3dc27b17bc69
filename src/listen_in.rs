//! Listen-in sessions: the switch connects to us, one socket per call.

use crate::{
    command::{Command, EslCommand},
    connection::{spawn_connection, ConnectionHandle, Role},
    error::{EslError, EslResult},
    event::{Classified, EslEvent, EventFormat, TypedEvent},
    reply::Reply,
    session::{EventStream, PendingReply, SessionOptions, SessionStatus},
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    future::Future,
    net::SocketAddr,
    sync::{Arc, OnceLock},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, ToSocketAddrs},
};
use tracing::{debug, info, warn};

/// Settings applied to every accepted connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenInOptions {
    pub session: SessionOptions,
}

impl Default for ListenInOptions {
    fn default() -> Self {
        Self {
            session: SessionOptions::listen_in(),
        }
    }
}

/// Channel data from the reply to `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub unique_id: Option<String>,
    pub channel_name: Option<String>,
    pub caller_id_number: Option<String>,
    pub caller_id_name: Option<String>,
    pub destination_number: Option<String>,
    /// Every header of the reply, as a headers-only event.
    pub event: EslEvent,
}

impl ConnectionInfo {
    fn from_reply(reply: Reply) -> Self {
        let event = EslEvent::HeadersOnly(
            reply
                .frame()
                .clone(),
        );
        Self {
            unique_id: event
                .unique_id()
                .map(|s| s.into_owned()),
            channel_name: event
                .channel_name()
                .map(|s| s.into_owned()),
            caller_id_number: event
                .caller_id_number()
                .map(|s| s.into_owned()),
            caller_id_name: event
                .caller_id_name()
                .map(|s| s.into_owned()),
            destination_number: event
                .destination_number()
                .map(|s| s.into_owned()),
            event,
        }
    }

    /// Any channel header or variable from the reply.
    pub fn field(&self, name: &str) -> Option<String> {
        self.event
            .field(name)
            .map(|s| s.into_owned())
    }
}

/// Per-call application logic.
///
/// Implement with `async fn`; the returned futures must be `Send` because
/// each connection runs on its own task.
///
/// ```rust,no_run
/// use esl_engine::{CallHandler, EslResult, ListenInSession};
///
/// struct Answerer;
///
/// impl CallHandler for Answerer {
///     async fn handle(&self, session: &ListenInSession) -> EslResult<()> {
///         session
///             .execute("playback", Some("ivr/ivr-welcome.wav"))
///             .await?
///             .into_result()?;
///         Ok(())
///     }
/// }
/// ```
pub trait CallHandler: Send + Sync + 'static {
    /// Runs after events are diverted, before the call is answered.
    fn pre_handle(&self, _session: &ListenInSession) -> impl Future<Output = EslResult<()>> + Send {
        async { Ok(()) }
    }

    /// Runs once the call is answered.
    fn handle(&self, session: &ListenInSession) -> impl Future<Output = EslResult<()>> + Send;

    fn handle_event(
        &self,
        _session: &ListenInSession,
        _event: TypedEvent,
    ) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Events with no registered constructor.
    fn handle_unhandled_event(
        &self,
        _session: &ListenInSession,
        event: EslEvent,
    ) -> impl Future<Output = ()> + Send {
        async move {
            debug!(
                "Unhandled event {}",
                event
                    .event_name()
                    .unwrap_or_default()
            );
        }
    }
}

/// Handle to one switch-initiated connection (Clone + Send + Sync).
#[derive(Clone)]
pub struct ListenInSession {
    handle: ConnectionHandle,
    info: Arc<OnceLock<ConnectionInfo>>,
}

impl fmt::Debug for ListenInSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenInSession")
            .field("state", &self.status().state)
            .field(
                "unique_id",
                &self
                    .connection_info()
                    .and_then(|i| {
                        i.unique_id
                            .as_deref()
                    }),
            )
            .finish()
    }
}

impl ListenInSession {
    /// Run the session over an already-accepted stream.
    pub fn from_stream<S>(stream: S, options: ListenInOptions) -> (Self, EventStream)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (handle, events) = spawn_connection(stream, Role::ListenIn, options.session);
        let session = Self {
            handle,
            info: Arc::new(OnceLock::new()),
        };
        (session, events)
    }

    /// Send `connect` and record the channel data from its reply.
    ///
    /// An `-ERR` reply or a closed connection aborts the session.
    pub async fn handshake(&self) -> EslResult<&ConnectionInfo> {
        let reply = self
            .handle
            .handshake()
            .await?
            .into_result()?;
        let info = self
            .info
            .get_or_init(|| ConnectionInfo::from_reply(reply));
        info!(
            "Listen-in connection for channel {}",
            info.unique_id
                .as_deref()
                .unwrap_or("<unknown>")
        );
        Ok(info)
    }

    /// Channel data, once the handshake completed.
    pub fn connection_info(&self) -> Option<&ConnectionInfo> {
        self.info
            .get()
    }

    pub fn status(&self) -> SessionStatus {
        self.handle
            .status()
    }

    /// Number of events dropped due to a full event queue.
    pub fn dropped_event_count(&self) -> u64 {
        self.handle
            .dropped_event_count()
    }

    pub fn send_command(&self, command: Command) -> PendingReply {
        self.handle
            .submit(command)
    }

    pub fn send(&self, command: EslCommand) -> PendingReply {
        self.handle
            .submit_esl(command)
    }

    pub fn resume(&self) -> PendingReply {
        self.send(EslCommand::Resume)
    }

    /// Subscribe to this channel's events.
    pub fn myevents(&self, format: EventFormat) -> PendingReply {
        self.send(EslCommand::MyEvents { format, uuid: None })
    }

    pub fn divert_events(&self, on: bool) -> PendingReply {
        self.send(EslCommand::DivertEvents { on })
    }

    /// Run an application on this channel.
    pub fn execute(&self, app: &str, args: Option<&str>) -> PendingReply {
        self.send(EslCommand::Execute {
            app: app.to_string(),
            args: args.map(str::to_string),
            uuid: None,
        })
    }

    pub fn hangup(&self, cause: Option<&str>) -> PendingReply {
        self.send(EslCommand::Hangup {
            cause: cause.map(str::to_string),
            uuid: None,
        })
    }

    /// Keep the socket open after hangup; `None` lingers until the switch
    /// decides.
    pub fn linger(&self, timeout: Option<u32>) -> PendingReply {
        self.send(EslCommand::Linger { timeout })
    }

    pub fn api(&self, command: &str) -> PendingReply {
        self.send(EslCommand::Api {
            command: command.to_string(),
        })
    }

    /// Close from our side; pending commands fail with `ConnectionClosed`.
    pub fn disconnect(&self) {
        self.handle
            .disconnect();
    }

    async fn round_trip(&self, step: &str, reply: PendingReply) -> EslResult<()> {
        let reply = reply
            .await?
            .into_result()?;
        debug!("Setup step {} done: {}", step, reply.text());
        Ok(())
    }

    /// Call setup, one round trip at a time, stopping at the first failure.
    pub async fn run_setup<H: CallHandler>(&self, handler: &H) -> EslResult<()> {
        self.round_trip("resume", self.resume())
            .await?;
        self.round_trip("myevents", self.myevents(EventFormat::Plain))
            .await?;
        self.round_trip("divert_events", self.divert_events(true))
            .await?;
        handler
            .pre_handle(self)
            .await?;
        self.round_trip("answer", self.execute("answer", None))
            .await?;
        handler
            .handle(self)
            .await
    }

    async fn handshake_and_setup<H: CallHandler>(&self, handler: &H) -> EslResult<()> {
        self.handshake()
            .await?;
        self.run_setup(handler)
            .await
    }

    async fn pump_events<H: CallHandler>(&self, handler: &H, events: &mut EventStream) {
        while let Some(item) = events
            .recv()
            .await
        {
            match item {
                Ok(Classified::Typed(event)) => {
                    handler
                        .handle_event(self, event)
                        .await
                }
                Ok(Classified::Unhandled(event)) => {
                    handler
                        .handle_unhandled_event(self, event)
                        .await
                }
                Err(EslError::QueueFull) => {
                    warn!(
                        "Events dropped for slow handler ({} so far)",
                        self.dropped_event_count()
                    );
                }
                Err(e) => warn!("Event stream error: {}", e),
            }
        }
    }

    /// Drive handshake, setup and event dispatch until the connection ends.
    ///
    /// A failed handshake or setup step disconnects and is returned once the
    /// event stream has drained.
    pub async fn run<H: CallHandler>(self, handler: Arc<H>, mut events: EventStream) -> EslResult<()> {
        let setup = async {
            let result = self
                .handshake_and_setup(handler.as_ref())
                .await;
            if let Err(e) = &result {
                warn!("Call setup aborted: {}", e);
                self.disconnect();
            }
            result
        };
        let pump = self.pump_events(handler.as_ref(), &mut events);
        let (result, ()) = tokio::join!(setup, pump);
        debug!("Listen-in session finished");
        result
    }
}

/// Accepts connections from the switch.
pub struct EslListener {
    listener: TcpListener,
    options: ListenInOptions,
}

impl fmt::Debug for EslListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EslListener")
            .field(
                "local_addr",
                &self
                    .listener
                    .local_addr()
                    .ok(),
            )
            .finish()
    }
}

impl EslListener {
    pub async fn bind(addr: impl ToSocketAddrs, options: ListenInOptions) -> EslResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Listening for switch connections on {}", listener.local_addr()?);
        Ok(Self::from_listener(listener, options))
    }

    pub fn from_listener(listener: TcpListener, options: ListenInOptions) -> Self {
        Self { listener, options }
    }

    pub fn local_addr(&self) -> EslResult<SocketAddr> {
        Ok(self
            .listener
            .local_addr()?)
    }

    /// Wait for the next connection; its task is already running.
    pub async fn accept(&self) -> EslResult<(ListenInSession, EventStream)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await?;
        info!("Accepted connection from {}", peer);
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed: {}", e);
        }
        Ok(ListenInSession::from_stream(stream, self.options.clone()))
    }

    /// Accept forever, one task per connection.
    ///
    /// Returns only when `accept` fails.
    pub async fn serve<H: CallHandler>(self, handler: Arc<H>) -> EslResult<()> {
        loop {
            let (session, events) = self
                .accept()
                .await?;
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Err(e) = session
                    .run(handler, events)
                    .await
                {
                    warn!("Call session ended with error: {}", e);
                }
            });
        }
    }
}
