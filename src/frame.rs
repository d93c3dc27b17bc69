//! The decoded protocol unit and its content type.

use crate::constants::{
    CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
    CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_LOG_DATA, CONTENT_TYPE_RUDE_REJECTION,
    CONTENT_TYPE_TEXT_EVENT_JSON, CONTENT_TYPE_TEXT_EVENT_PLAIN, CONTENT_TYPE_TEXT_EVENT_XML,
    HEADER_CONTENT_LENGTH, HEADER_CONTENT_TYPE, LINE_TERMINATOR,
};
use serde::Serialize;
use std::collections::HashMap;

/// Frame kinds, keyed by the `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    /// Switch asks a dial-out client to authenticate
    AuthRequest,
    /// Reply to a socket command (`Reply-Text` carries the status)
    CommandReply,
    /// Reply to `api`, payload in the body
    ApiResponse,
    /// Event with `Name: value` fields in the body
    EventPlain,
    /// JSON-encoded event
    EventJson,
    /// XML-encoded event
    EventXml,
    /// Forwarded log line
    LogData,
    /// Switch is about to close the socket
    DisconnectNotice,
    /// Switch refused the connection (ACL)
    RudeRejection,
    /// Anything else
    Unknown(String),
}

impl ContentType {
    /// Parse message type from a Content-Type header value
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            CONTENT_TYPE_AUTH_REQUEST => ContentType::AuthRequest,
            CONTENT_TYPE_COMMAND_REPLY => ContentType::CommandReply,
            CONTENT_TYPE_API_RESPONSE => ContentType::ApiResponse,
            CONTENT_TYPE_TEXT_EVENT_PLAIN => ContentType::EventPlain,
            CONTENT_TYPE_TEXT_EVENT_JSON => ContentType::EventJson,
            CONTENT_TYPE_TEXT_EVENT_XML => ContentType::EventXml,
            CONTENT_TYPE_LOG_DATA => ContentType::LogData,
            CONTENT_TYPE_DISCONNECT_NOTICE => ContentType::DisconnectNotice,
            CONTENT_TYPE_RUDE_REJECTION => ContentType::RudeRejection,
            _ => ContentType::Unknown(content_type.to_string()),
        }
    }

    /// Replies are matched against pending commands.
    pub fn is_reply(&self) -> bool {
        matches!(self, ContentType::CommandReply | ContentType::ApiResponse)
    }

    /// Unsolicited notifications routed to the event classifier.
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            ContentType::EventPlain
                | ContentType::EventJson
                | ContentType::EventXml
                | ContentType::LogData
        )
    }
}

/// One decoded protocol unit: a header map plus the raw body lines.
///
/// Frames come out of [`FrameDecoder`](crate::FrameDecoder) and are not
/// modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Frame {
    headers: HashMap<String, String>,
    body_lines: Vec<String>,
}

impl Frame {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers
            .insert(name.into(), value.into());
    }

    pub(crate) fn push_body_line(&mut self, line: impl Into<String>) {
        self.body_lines
            .push(line.into());
    }

    /// No headers and no body lines.
    pub fn is_empty(&self) -> bool {
        self.headers
            .is_empty()
            && self
                .body_lines
                .is_empty()
    }

    /// Look up a header by name (case-sensitive).
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .map(|s| s.as_str())
    }

    /// All headers.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Body split on LF, in wire order.
    pub fn body_lines(&self) -> &[String] {
        &self.body_lines
    }

    /// Body lines joined back with LF, `None` when there is no body.
    pub fn body(&self) -> Option<String> {
        if self
            .body_lines
            .is_empty()
        {
            return None;
        }
        Some(
            self.body_lines
                .join(LINE_TERMINATOR),
        )
    }

    /// Parsed `Content-Type`, if present.
    pub fn content_type(&self) -> Option<ContentType> {
        self.header(HEADER_CONTENT_TYPE)
            .map(ContentType::from_content_type)
    }

    /// Raw `Content-Length` header value, if present.
    pub fn content_length(&self) -> Option<&str> {
        self.header(HEADER_CONTENT_LENGTH)
    }
}

#[cfg(test)]
impl Frame {
    /// Build a frame directly for unit tests elsewhere in the crate.
    pub(crate) fn from_parts(headers: &[(&str, &str)], body_lines: &[&str]) -> Self {
        let mut frame = Frame::new();
        for (name, value) in headers {
            frame.insert_header(*name, *value);
        }
        for line in body_lines {
            frame.push_body_line(*line);
        }
        frame
    }
}
