//! Incremental frame decoder.
//!
//! The wire format is a block of `Name: value` lines closed by a blank line,
//! optionally followed by exactly `Content-Length` bytes of body. Bytes may
//! arrive split at any position; [`FrameDecoder::decode`] returns `Ok(None)`
//! until a whole frame is buffered and never loses partial input.

use crate::{
    buffer::EslBuffer,
    constants::{
        DEFAULT_MAX_LINE_LENGTH, HEADER_CONTENT_LENGTH, MAX_BUFFER_SIZE, MAX_MESSAGE_SIZE,
    },
    error::{EslError, EslResult},
    frame::Frame,
    headers::{decode_value, has_header_separator, parse_header_line},
};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// What to do with a header line that has no `:` or an empty name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedLinePolicy {
    /// Keep the raw line as a body line of the pending frame.
    AppendToBody,
    /// Consume the line and report [`EslError::ProtocolViolation`].
    #[default]
    Reject,
}

/// Decoder limits and line handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Longest header or body line. Default: 1MB.
    pub max_line_length: usize,
    /// Largest accepted `Content-Length`. Default: 8MB.
    pub max_body_length: usize,
    /// Cap on undecoded buffered bytes. Default: 16MB.
    pub max_buffer_size: usize,
    /// Handling of header lines that are not `Name: value`.
    pub malformed_lines: MalformedLinePolicy,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_body_length: MAX_MESSAGE_SIZE,
            max_buffer_size: MAX_BUFFER_SIZE,
            malformed_lines: MalformedLinePolicy::Reject,
        }
    }
}

impl DecoderConfig {
    /// Default limits with lenient malformed-line handling.
    pub fn lenient() -> Self {
        Self {
            malformed_lines: MalformedLinePolicy::AppendToBody,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    ReadHeader,
    ReadBody { target: usize },
}

/// Two-state incremental decoder: `ReadHeader` ⇄ `ReadBody`.
pub struct FrameDecoder {
    buffer: EslBuffer,
    state: DecodeState,
    pending: Frame,
    config: DecoderConfig,
}

impl FrameDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            buffer: EslBuffer::new(config.max_buffer_size),
            state: DecodeState::ReadHeader,
            pending: Frame::new(),
            config,
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Bytes received but not yet part of an emitted frame.
    pub fn buffered(&self) -> usize {
        self.buffer
            .len()
    }

    /// Whether the decoder is waiting for body bytes.
    pub fn is_reading_body(&self) -> bool {
        matches!(self.state, DecodeState::ReadBody { .. })
    }

    /// Append received bytes.
    pub fn feed(&mut self, data: &[u8]) -> EslResult<()> {
        self.buffer
            .extend_from_slice(data);
        self.buffer
            .check_size_limits()
    }

    /// Try to decode the next complete frame from buffered bytes.
    ///
    /// `Ok(None)` means more bytes are needed. After a
    /// [`ProtocolViolation`](EslError::ProtocolViolation) the offending line
    /// is gone and decoding may continue; after
    /// [`FrameTooLong`](EslError::FrameTooLong) the stream is unusable.
    pub fn decode(&mut self) -> EslResult<Option<Frame>> {
        loop {
            match self.state {
                DecodeState::ReadHeader => {
                    let Some(raw) = self
                        .buffer
                        .take_line(self.config.max_line_length)?
                    else {
                        return Ok(None);
                    };
                    let text = String::from_utf8_lossy(&raw);
                    let line = text
                        .strip_suffix('\r')
                        .unwrap_or(&text);

                    if line.is_empty() {
                        if let Some(frame) = self.finish_headers()? {
                            return Ok(Some(frame));
                        }
                        continue;
                    }

                    self.header_line(line)?;
                }
                DecodeState::ReadBody { target } => {
                    let Some(body) = self
                        .buffer
                        .take_bytes(target)
                    else {
                        trace!(
                            "[DECODE] Waiting for body: have {} of {} bytes",
                            self.buffer
                                .len(),
                            target
                        );
                        return Ok(None);
                    };
                    self.state = DecodeState::ReadHeader;
                    return self
                        .finish_body(&body)
                        .map(Some);
                }
            }
        }
    }

    fn header_line(&mut self, line: &str) -> EslResult<()> {
        let (name, value) = parse_header_line(line);
        if !name.is_empty() && has_header_separator(line) {
            let value = decode_value(value);
            self.pending
                .insert_header(name, value);
            return Ok(());
        }

        match self
            .config
            .malformed_lines
        {
            MalformedLinePolicy::AppendToBody => {
                trace!("[DECODE] Non-header line kept as body: {:?}", line);
                self.pending
                    .push_body_line(line);
                Ok(())
            }
            MalformedLinePolicy::Reject => Err(EslError::protocol_violation(format!(
                "malformed header line: {:?}",
                line
            ))),
        }
    }

    /// Header block complete: emit now, or switch to reading the body.
    fn finish_headers(&mut self) -> EslResult<Option<Frame>> {
        if self
            .pending
            .is_empty()
        {
            trace!("[DECODE] Skipping blank line between frames");
            return Ok(None);
        }

        let Some(raw_length) = self
            .pending
            .header(HEADER_CONTENT_LENGTH)
            .map(|v| v.trim().to_string())
        else {
            return Ok(Some(std::mem::take(&mut self.pending)));
        };

        let target = raw_length
            .parse::<usize>()
            .unwrap_or_else(|_| {
                warn!(
                    "Unparseable Content-Length {:?}, treating as 0",
                    raw_length
                );
                0
            });
        if target > self.config.max_body_length {
            return Err(EslError::FrameTooLong {
                length: target,
                limit: self.config.max_body_length,
            });
        }

        self.state = DecodeState::ReadBody { target };
        Ok(None)
    }

    fn finish_body(&mut self, body: &[u8]) -> EslResult<Frame> {
        let mut frame = std::mem::take(&mut self.pending);
        if body.is_empty() {
            return Ok(frame);
        }

        let text = String::from_utf8_lossy(body);
        for line in text.split('\n') {
            if line.len() > self.config.max_line_length {
                return Err(EslError::FrameTooLong {
                    length: line.len(),
                    limit: self.config.max_line_length,
                });
            }
            frame.push_body_line(line);
        }
        Ok(frame)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}
