//! Event socket protocol engine for Rust
//!
//! This crate implements the text protocol spoken by the switch's event
//! socket: a frame decoder and encoder, FIFO correlation of commands with
//! their replies, a typed event taxonomy, and the two session roles.
//!
//! # Architecture
//!
//! Each connection is owned by one background task that holds the decoder,
//! the correlator and the write half of the socket. Applications talk to it
//! through cheap handles:
//! - [`DialOutSession`] / [`ListenInSession`] (Clone + Send) send commands from any task
//! - [`EventStream`] receives classified events from the connection task
//!
//! Replies carry no identifier on the wire; the switch answers strictly in
//! order, so every command gets a [`PendingReply`] that resolves when its turn
//! in the queue comes up.
//!
//! # Examples
//!
//! ## Dial-out
//!
//! We connect to the switch and authenticate with a password:
//!
//! ```rust,no_run
//! use esl_engine::{DialOutConfig, DialOutSession, EslError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let config = DialOutConfig::new("localhost", 8021, "ClueCon");
//!     let (session, _events) = DialOutSession::connect(config).await?;
//!     session.ready().await?;
//!
//!     if let Some(reply) = session.api("status") {
//!         println!("Status: {}", reply.await?.text());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Listen-in
//!
//! The switch connects to *your* application through the `socket` dialplan
//! application, one connection per call. Implement [`CallHandler`] and let
//! [`EslListener::serve`] run the call setup:
//!
//! ```rust,no_run
//! use esl_engine::{CallHandler, EslListener, EslResult, ListenInOptions, ListenInSession};
//! use std::sync::Arc;
//!
//! struct Welcome;
//!
//! impl CallHandler for Welcome {
//!     async fn handle(&self, session: &ListenInSession) -> EslResult<()> {
//!         session
//!             .execute("playback", Some("ivr/ivr-welcome.wav"))
//!             .await?
//!             .into_result()?;
//!         session
//!             .hangup(None)
//!             .await?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> EslResult<()> {
//!     let listener = EslListener::bind("0.0.0.0:8040", ListenInOptions::default()).await?;
//!     listener
//!         .serve(Arc::new(Welcome))
//!         .await
//! }
//! ```
//!
//! Configure the switch to connect to your app:
//! ```xml
//! <action application="socket" data="127.0.0.1:8040 async full"/>
//! ```
//!
//! ## Event Subscription
//!
//! ```rust,no_run
//! use esl_engine::{Classified, DialOutConfig, DialOutSession, EslEventType, EventFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (session, mut events) =
//!         DialOutSession::connect(DialOutConfig::new("localhost", 8021, "ClueCon")).await?;
//!     session.ready().await?;
//!
//!     if let Some(reply) = session.subscribe_events(
//!         EventFormat::Plain,
//!         &[EslEventType::ChannelAnswer, EslEventType::ChannelHangup],
//!     ) {
//!         reply.await?.into_result()?;
//!     }
//!
//!     while let Some(Ok(item)) = events.recv().await {
//!         if let Classified::Typed(event) = item {
//!             println!("Received event: {}", event.event_type());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Frame codec
//!
//! The codec is usable on its own:
//!
//! ```rust
//! use esl_engine::{ContentType, FrameDecoder};
//!
//! let mut decoder = FrameDecoder::default();
//! decoder
//!     .feed(b"Content-Type: api/response\nContent-Length: 3\n\nUP\n")
//!     .unwrap();
//! let frame = decoder
//!     .decode()
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(frame.content_type(), Some(ContentType::ApiResponse));
//! assert_eq!(frame.body().as_deref(), Some("UP\n"));
//! ```

#[macro_use]
mod macros;

pub mod channel;
pub mod command;
pub mod constants;
pub mod correlator;
pub mod decoder;
pub mod dial_out;
pub mod encoder;
pub mod error;
pub mod event;
pub mod frame;
pub mod headers;
pub mod id;
pub mod listen_in;
pub mod reply;
pub mod session;

pub(crate) mod buffer;
pub(crate) mod connection;

pub use channel::{AnswerState, CallDirection, CallState, ChannelState};
pub use command::{Command, EslCommand};
pub use constants::DEFAULT_ESL_PORT;
pub use correlator::CommandCorrelator;
pub use decoder::{DecoderConfig, FrameDecoder, MalformedLinePolicy};
pub use dial_out::{DialOutConfig, DialOutSession};
pub use encoder::FrameEncoder;
pub use error::{EslError, EslResult};
pub use event::{
    Classified, EslEvent, EslEventType, EventConstructor, EventFormat, EventRegistry, TypedEvent,
};
pub use frame::{ContentType, Frame};
pub use headers::{parse_header_line, EventHeader};
pub use id::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use listen_in::{CallHandler, ConnectionInfo, EslListener, ListenInOptions, ListenInSession};
pub use reply::{ApiResponse, CommandReply, Reply, ReplyStatus};
pub use session::{
    DisconnectReason, EventItem, EventStream, PendingReply, SessionOptions, SessionState,
    SessionStatus, ViolationPolicy,
};
