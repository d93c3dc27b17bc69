//! Typed views over reply frames.

use crate::{
    constants::HEADER_REPLY_TEXT,
    error::{EslError, EslResult},
    frame::{ContentType, Frame},
    headers::EventHeader,
};
use serde::de::DeserializeOwned;

/// Classification of the `Reply-Text` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// Reply-Text starts with `+OK` or is absent/empty.
    Ok,
    /// Reply-Text starts with `-ERR`.
    Err,
    /// Reply-Text present but matches neither `+OK` nor `-ERR`.
    /// Normal for `getvar`, which returns the bare variable value.
    Other,
}

impl ReplyStatus {
    fn from_reply_text(text: Option<&str>) -> Self {
        match text {
            None | Some("") => ReplyStatus::Ok,
            Some(t) if t.starts_with("+OK") => ReplyStatus::Ok,
            Some(t) if t.starts_with("-ERR") => ReplyStatus::Err,
            Some(_) => ReplyStatus::Other,
        }
    }
}

/// A `command/reply` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    frame: Frame,
    status: ReplyStatus,
}

impl CommandReply {
    pub fn new(frame: Frame) -> Self {
        let status = ReplyStatus::from_reply_text(frame.header(HEADER_REPLY_TEXT));
        Self { frame, status }
    }

    /// `true` if Reply-Text is `+OK` or absent.
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    pub fn reply_status(&self) -> ReplyStatus {
        self.status
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.frame
            .header(HEADER_REPLY_TEXT)
    }

    /// `Job-UUID` header from `bgapi` replies.
    pub fn job_uuid(&self) -> Option<&str> {
        self.frame
            .header(EventHeader::JobUuid)
    }

    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.frame
            .header(name)
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    /// `-ERR` becomes [`EslError::CommandFailed`], anything other than `+OK`
    /// becomes [`EslError::UnexpectedReply`].
    pub fn into_result(self) -> EslResult<Self> {
        match self.status {
            ReplyStatus::Ok => Ok(self),
            ReplyStatus::Err => {
                let reply_text = self
                    .reply_text()
                    .unwrap_or("-ERR")
                    .to_string();
                Err(EslError::CommandFailed { reply_text })
            }
            ReplyStatus::Other => {
                let reply_text = self
                    .reply_text()
                    .unwrap_or("")
                    .to_string();
                Err(EslError::UnexpectedReply { reply_text })
            }
        }
    }
}

/// An `api/response` frame; the payload is the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    frame: Frame,
    body: String,
}

impl ApiResponse {
    pub fn new(frame: Frame) -> Self {
        let body = frame
            .body()
            .unwrap_or_default();
        Self { frame, body }
    }

    /// `false` only when the body starts with `-ERR`.
    pub fn is_ok(&self) -> bool {
        !self
            .body
            .starts_with("-ERR")
    }

    /// The response payload (empty when the frame had no body).
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Deserialize a JSON payload (e.g. `api show channels as json`).
    pub fn json<T: DeserializeOwned>(&self) -> EslResult<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn into_result(self) -> EslResult<Self> {
        if self.is_ok() {
            return Ok(self);
        }
        let reply_text = self
            .body
            .trim_end()
            .to_string();
        Err(EslError::CommandFailed { reply_text })
    }
}

/// Reply to one command, typed by the frame's content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Command(CommandReply),
    Api(ApiResponse),
}

impl Reply {
    /// `api/response` frames become [`ApiResponse`], everything else
    /// [`CommandReply`].
    pub fn from_frame(frame: Frame) -> Self {
        match frame.content_type() {
            Some(ContentType::ApiResponse) => Reply::Api(ApiResponse::new(frame)),
            _ => Reply::Command(CommandReply::new(frame)),
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            Reply::Command(r) => r.is_ok(),
            Reply::Api(r) => r.is_ok(),
        }
    }

    pub fn frame(&self) -> &Frame {
        match self {
            Reply::Command(r) => r.frame(),
            Reply::Api(r) => r.frame(),
        }
    }

    /// `Reply-Text` for command replies, the body for api responses.
    pub fn text(&self) -> &str {
        match self {
            Reply::Command(r) => r
                .reply_text()
                .unwrap_or(""),
            Reply::Api(r) => r.body(),
        }
    }

    pub fn as_command(&self) -> Option<&CommandReply> {
        match self {
            Reply::Command(r) => Some(r),
            Reply::Api(_) => None,
        }
    }

    pub fn as_api(&self) -> Option<&ApiResponse> {
        match self {
            Reply::Api(r) => Some(r),
            Reply::Command(_) => None,
        }
    }

    pub fn into_result(self) -> EslResult<Self> {
        match self {
            Reply::Command(r) => r
                .into_result()
                .map(Reply::Command),
            Reply::Api(r) => r
                .into_result()
                .map(Reply::Api),
        }
    }
}
