//! Error types for the event socket engine

use thiserror::Error;

/// Result alias used across the crate.
pub type EslResult<T> = Result<T, EslError>;

/// Everything that can go wrong while speaking the event socket protocol.
///
/// Note that a `-ERR` reply is *not* an error: it decodes into a normal
/// [`CommandReply`](crate::CommandReply) whose `is_ok()` is `false`. Call
/// [`CommandReply::into_result`](crate::CommandReply::into_result) to turn it
/// into [`EslError::CommandFailed`] when that is more convenient.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EslError {
    /// Socket-level failure. Always fatal to the connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A header or body line (or the undecoded buffer) exceeded its limit.
    #[error("frame too long: {length} bytes exceeds limit of {limit}")]
    FrameTooLong { length: usize, limit: usize },

    /// Malformed header line in strict mode, or a reply nobody was waiting for.
    #[error("protocol violation: {message}")]
    ProtocolViolation { message: String },

    /// The connection closed before the operation completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The session is not connected.
    #[error("not connected")]
    NotConnected,

    /// A caller-side timeout elapsed.
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The switch rejected our credentials.
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// `Reply-Text` started with `-ERR`.
    #[error("command failed: {reply_text}")]
    CommandFailed { reply_text: String },

    /// `Reply-Text` matched neither `+OK` nor `-ERR`.
    #[error("unexpected reply: {reply_text}")]
    UnexpectedReply { reply_text: String },

    /// The command could not be rendered onto the wire.
    #[error("invalid command: {message}")]
    InvalidCommand { message: String },

    /// One or more events were dropped because the application fell behind.
    #[error("event queue full, events were dropped")]
    QueueFull,

    /// JSON body could not be deserialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EslError {
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        EslError::ProtocolViolation {
            message: message.into(),
        }
    }

    pub fn auth_failed(reason: impl Into<String>) -> Self {
        EslError::AuthFailed {
            reason: reason.into(),
        }
    }

    pub fn invalid_command(message: impl Into<String>) -> Self {
        EslError::InvalidCommand {
            message: message.into(),
        }
    }

    /// Errors that close the connection regardless of policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EslError::Io(_) | EslError::FrameTooLong { .. } | EslError::ConnectionClosed
        )
    }

    /// Whether the error means the connection is gone.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            EslError::Io(_) | EslError::ConnectionClosed | EslError::NotConnected
        )
    }
}
