//! Channel and call state values carried in event fields.

use std::fmt;

/// Error returned when a channel-related field holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelValueError(pub String);

impl fmt::Display for ParseChannelValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel value: {}", self.0)
    }
}

impl std::error::Error for ParseChannelValueError {}

define_header_enum! {
    error_type: ParseChannelValueError,
    /// `Channel-State` (`CS_ROUTING`); `Channel-State-Number` carries the
    /// same value as an integer.
    pub enum ChannelState {
        CsNew => "CS_NEW",
        CsInit => "CS_INIT",
        CsRouting => "CS_ROUTING",
        CsSoftExecute => "CS_SOFT_EXECUTE",
        CsExecute => "CS_EXECUTE",
        CsExchangeMedia => "CS_EXCHANGE_MEDIA",
        CsPark => "CS_PARK",
        CsConsumeMedia => "CS_CONSUME_MEDIA",
        CsHibernate => "CS_HIBERNATE",
        CsReset => "CS_RESET",
        CsHangup => "CS_HANGUP",
        CsReporting => "CS_REPORTING",
        CsDestroy => "CS_DESTROY",
        CsNone => "CS_NONE",
    }
}

impl ChannelState {
    /// Parse from the `Channel-State-Number` value.
    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL
            .get(usize::from(n))
            .copied()
    }

    pub fn as_number(&self) -> u8 {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .and_then(|i| u8::try_from(i).ok())
            .unwrap_or(u8::MAX)
    }
}

define_header_enum! {
    error_type: ParseChannelValueError,
    /// `Channel-Call-State`.
    pub enum CallState {
        Down => "DOWN",
        Dialing => "DIALING",
        Ringing => "RINGING",
        Early => "EARLY",
        Active => "ACTIVE",
        Held => "HELD",
        RingWait => "RING_WAIT",
        Hangup => "HANGUP",
        Unheld => "UNHELD",
    }
}

define_header_enum! {
    error_type: ParseChannelValueError,
    /// `Answer-State`.
    pub enum AnswerState {
        Hangup => "hangup",
        Answered => "answered",
        Early => "early",
        Ringing => "ringing",
    }
}

define_header_enum! {
    error_type: ParseChannelValueError,
    /// `Call-Direction`.
    pub enum CallDirection {
        Inbound => "inbound",
        Outbound => "outbound",
    }
}
