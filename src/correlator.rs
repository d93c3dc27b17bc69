//! FIFO matching of sent commands to their replies.
//!
//! The switch answers commands strictly in the order it received them, and
//! replies carry no identifier. The correlator therefore only needs a queue,
//! as long as every entry is pushed before its bytes hit the wire.

use crate::{
    command::Command,
    encoder::FrameEncoder,
    error::{EslError, EslResult},
    frame::Frame,
    reply::Reply,
};
use std::collections::VecDeque;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::oneshot,
};
use tracing::{debug, trace};

/// Commands the connection task sends on its own behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalCommand {
    /// Automatic `auth` in answer to `auth/request`.
    Auth,
    /// Listen-in `connect` handshake.
    Connect,
}

/// Where a reply goes once it arrives.
#[derive(Debug)]
pub enum Completion {
    Caller(oneshot::Sender<EslResult<Reply>>),
    Internal(InternalCommand),
}

impl Completion {
    fn resolve(self, result: EslResult<Reply>) -> Option<(InternalCommand, EslResult<Reply>)> {
        match self {
            Completion::Caller(tx) => {
                // A dropped receiver only means the caller stopped waiting.
                let _ = tx.send(result);
                None
            }
            Completion::Internal(kind) => Some((kind, result)),
        }
    }
}

#[derive(Debug)]
struct PendingCommand {
    command: Command,
    completion: Completion,
}

/// Per-connection queue of commands awaiting a reply.
#[derive(Debug, Default)]
pub struct CommandCorrelator {
    pending: VecDeque<PendingCommand>,
}

impl CommandCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `command`, then write it.
    ///
    /// Only transport failures are returned; the entry stays queued and is
    /// resolved by [`on_close`](Self::on_close) when the connection goes down.
    /// A command that encodes to nothing is resolved with `InvalidCommand`
    /// without touching the queue or the wire.
    pub async fn send<W>(
        &mut self,
        writer: &mut W,
        encoder: &FrameEncoder,
        command: Command,
        completion: Completion,
    ) -> EslResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let bytes = encoder.encode(&command);
        if bytes.is_empty() {
            debug!("Refusing to send empty command {:?}", command);
            completion.resolve(Err(EslError::invalid_command("command renders to nothing")));
            return Ok(());
        }

        debug!(
            token = command.token(),
            queued = self.pending.len(),
            "[SEND] {}",
            command.log_line()
        );
        self.pending
            .push_back(PendingCommand {
                command,
                completion,
            });
        writer
            .write_all(&bytes)
            .await?;
        writer
            .flush()
            .await?;
        Ok(())
    }

    /// Match a reply frame to the oldest pending command.
    ///
    /// Returns the reply for internal commands so the owner can act on it.
    /// An empty queue is a `ProtocolViolation`; nothing is consumed.
    pub fn on_reply(&mut self, frame: Frame) -> EslResult<Option<(InternalCommand, Reply)>> {
        let Some(pending) = self
            .pending
            .pop_front()
        else {
            let detail = frame
                .header(crate::constants::HEADER_REPLY_TEXT)
                .map(str::to_string)
                .or_else(|| frame.body())
                .unwrap_or_default();
            return Err(EslError::protocol_violation(format!(
                "reply with no pending command: {}",
                detail.trim()
            )));
        };

        let reply = Reply::from_frame(frame);
        trace!(
            token = pending
                .command
                .token(),
            ok = reply.is_ok(),
            "[RECV] reply for {}",
            pending
                .command
                .log_line()
        );
        Ok(pending
            .completion
            .resolve(Ok(reply))
            .and_then(|(kind, result)| {
                result
                    .ok()
                    .map(|reply| (kind, reply))
            }))
    }

    /// Fail every pending command with `ConnectionClosed` and clear the queue.
    pub fn on_close(&mut self) -> usize {
        let count = self
            .pending
            .len();
        for pending in self
            .pending
            .drain(..)
        {
            pending
                .completion
                .resolve(Err(EslError::ConnectionClosed));
        }
        if count > 0 {
            debug!("Flushed {} pending command(s) on close", count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending
            .is_empty()
    }
}
