//! Header line parsing and typed event header names.

use percent_encoding::percent_decode_str;
use std::borrow::Cow;

/// Split one `Name: value` line into its name and value.
///
/// The name starts at the first non-whitespace character and runs until a
/// `:` or whitespace. The value is whatever follows the first `:`, trimmed on
/// both sides (an incidental trailing CR goes with the trailing whitespace).
/// Without a `:` the whole trimmed line is the name and the value is empty;
/// use [`has_header_separator`] to tell that case apart.
///
/// ```
/// use esl_engine::headers::parse_header_line;
///
/// assert_eq!(parse_header_line("Content-Length: 1754"), ("Content-Length", "1754"));
/// assert_eq!(parse_header_line("  no colon here \r"), ("no colon here", ""));
/// ```
pub fn parse_header_line(line: &str) -> (&str, &str) {
    let trimmed = line.trim_start();
    let Some(colon) = trimmed.find(':') else {
        return (trimmed.trim_end(), "");
    };
    let name_end = trimmed
        .find(|c: char| c == ':' || c.is_whitespace())
        .unwrap_or(colon);
    let name = &trimmed[..name_end];
    let value = trimmed[colon + 1..].trim();
    (name, value)
}

/// Whether the line contains the `:` separating a header name from its value.
pub fn has_header_separator(line: &str) -> bool {
    line.contains(':')
}

/// Percent-decode a header value, keeping the raw text when the escapes are
/// invalid or decode to non-UTF-8.
pub(crate) fn decode_value(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(raw))
}

/// Error returned when parsing an unrecognized event header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventHeaderError(pub String);

impl std::fmt::Display for ParseEventHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event header: {}", self.0)
    }
}

impl std::error::Error for ParseEventHeaderError {}

define_header_enum! {
    error_type: ParseEventHeaderError,
    /// Field names carried by events and by the listen-in `connect` reply.
    ///
    /// Use with [`EslEvent::field()`](crate::EslEvent::field) for typed lookups.
    pub enum EventHeader {
        EventName => "Event-Name",
        EventSubclass => "Event-Subclass",
        UniqueId => "Unique-ID",
        CallerUniqueId => "Caller-Unique-ID",
        OtherLegUniqueId => "Other-Leg-Unique-ID",
        JobUuid => "Job-UUID",
        JobCommand => "Job-Command",
        JobCommandArg => "Job-Command-Arg",
        ChannelName => "Channel-Name",
        ChannelState => "Channel-State",
        ChannelStateNumber => "Channel-State-Number",
        ChannelCallState => "Channel-Call-State",
        OriginalChannelCallState => "Original-Channel-Call-State",
        AnswerState => "Answer-State",
        CallDirection => "Call-Direction",
        HangupCause => "Hangup-Cause",
        Application => "Application",
        ApplicationData => "Application-Data",
        ApplicationResponse => "Application-Response",
        ApplicationUuid => "Application-UUID",
        DtmfDigit => "DTMF-Digit",
        DtmfDuration => "DTMF-Duration",
        DtmfSource => "DTMF-Source",
        CallerCallerIdName => "Caller-Caller-ID-Name",
        CallerCallerIdNumber => "Caller-Caller-ID-Number",
        CallerDestinationNumber => "Caller-Destination-Number",
        CallerContext => "Caller-Context",
        CoreUuid => "Core-UUID",
        UpTime => "Up-Time",
        SessionCount => "Session-Count",
        EventSequence => "Event-Sequence",
        EventDateTimestamp => "Event-Date-Timestamp",
        BridgeAUniqueId => "Bridge-A-Unique-ID",
        BridgeBUniqueId => "Bridge-B-Unique-ID",
        PlaybackFilePath => "Playback-File-Path",
        RecordFilePath => "Record-File-Path",
    }
}
