//! Protocol constants and configuration defaults

/// Default switch port for dial-out connections
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Socket read chunk size (64KB)
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Initial buffer allocation (64KB)
pub const BUF_CHUNK: usize = 64 * 1024;

/// Longest accepted header or body line (1MB). `sofia status` style API
/// output stays well below this.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest accepted `Content-Length` (8MB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024 * 1024;

/// Hard cap on buffered, undecoded bytes (16MB)
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Protocol message terminators
pub const HEADER_TERMINATOR: &str = "\n\n";
pub const LINE_TERMINATOR: &str = "\n";

/// Content-Type header values
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_TEXT_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_TEXT_EVENT_JSON: &str = "text/event-json";
pub const CONTENT_TYPE_TEXT_EVENT_XML: &str = "text/event-xml";
pub const CONTENT_TYPE_LOG_DATA: &str = "log/data";
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";
pub const CONTENT_TYPE_RUDE_REJECTION: &str = "text/rude-rejection";

/// Protocol framing header names (not event payload).
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Protocol framing header: body length.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Protocol framing header: command reply status.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";
/// Disconnect notice disposition (`linger` keeps the socket open).
pub const HEADER_CONTENT_DISPOSITION: &str = "Content-Disposition";

/// Prefix under which channel variables appear in headers-only events.
pub const VARIABLE_PREFIX: &str = "variable_";

/// TCP connect timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Maximum number of queued events before dropping
pub const MAX_EVENT_QUEUE_SIZE: usize = 1000;
