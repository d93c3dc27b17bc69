//! ESL event types, the two frame views, and typed classification.

use crate::{
    channel::{AnswerState, CallDirection, CallState, ChannelState},
    constants::{CONTENT_TYPE_TEXT_EVENT_JSON, CONTENT_TYPE_TEXT_EVENT_XML, VARIABLE_PREFIX},
    frame::{ContentType, Frame},
    headers::{decode_value, has_header_separator, parse_header_line, EventHeader},
};
use std::{borrow::Cow, collections::HashMap, fmt, ops::Deref, str::FromStr};

/// Event format types supported by FreeSWITCH ESL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventFormat {
    /// Plain text format (default)
    Plain,
    /// JSON format
    Json,
    /// XML format
    Xml,
}

impl EventFormat {
    /// Determine event format from a Content-Type header value.
    pub fn from_content_type(ct: &str) -> Self {
        match ct {
            CONTENT_TYPE_TEXT_EVENT_JSON => Self::Json,
            CONTENT_TYPE_TEXT_EVENT_XML => Self::Xml,
            _ => Self::Plain,
        }
    }
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFormat::Plain => write!(f, "plain"),
            EventFormat::Json => write!(f, "json"),
            EventFormat::Xml => write!(f, "xml"),
        }
    }
}

impl FromStr for EventFormat {
    type Err = ParseEventFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            _ => Err(ParseEventFormatError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid event format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventFormatError(pub String);

impl fmt::Display for ParseEventFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event format: {}", self.0)
    }
}

impl std::error::Error for ParseEventFormatError {}

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventTypeError(pub String);

impl fmt::Display for ParseEventTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for ParseEventTypeError {}

define_header_enum! {
    error_type: ParseEventTypeError,
    /// Event names as they appear in `Event-Name` and in `event` subscriptions.
    pub enum EslEventType {
        Custom => "CUSTOM",
        Clone => "CLONE",
        ChannelCreate => "CHANNEL_CREATE",
        ChannelDestroy => "CHANNEL_DESTROY",
        ChannelState => "CHANNEL_STATE",
        ChannelCallstate => "CHANNEL_CALLSTATE",
        ChannelAnswer => "CHANNEL_ANSWER",
        ChannelHangup => "CHANNEL_HANGUP",
        ChannelHangupComplete => "CHANNEL_HANGUP_COMPLETE",
        ChannelExecute => "CHANNEL_EXECUTE",
        ChannelExecuteComplete => "CHANNEL_EXECUTE_COMPLETE",
        ChannelHold => "CHANNEL_HOLD",
        ChannelUnhold => "CHANNEL_UNHOLD",
        ChannelBridge => "CHANNEL_BRIDGE",
        ChannelUnbridge => "CHANNEL_UNBRIDGE",
        ChannelProgress => "CHANNEL_PROGRESS",
        ChannelProgressMedia => "CHANNEL_PROGRESS_MEDIA",
        ChannelOutgoing => "CHANNEL_OUTGOING",
        ChannelPark => "CHANNEL_PARK",
        ChannelUnpark => "CHANNEL_UNPARK",
        ChannelApplication => "CHANNEL_APPLICATION",
        ChannelOriginate => "CHANNEL_ORIGINATE",
        ChannelUuid => "CHANNEL_UUID",
        Api => "API",
        Log => "LOG",
        InboundChan => "INBOUND_CHAN",
        OutboundChan => "OUTBOUND_CHAN",
        Startup => "STARTUP",
        Shutdown => "SHUTDOWN",
        Publish => "PUBLISH",
        Unpublish => "UNPUBLISH",
        Talk => "TALK",
        Notalk => "NOTALK",
        SessionCrash => "SESSION_CRASH",
        ModuleLoad => "MODULE_LOAD",
        ModuleUnload => "MODULE_UNLOAD",
        Dtmf => "DTMF",
        Message => "MESSAGE",
        PresenceIn => "PRESENCE_IN",
        NotifyIn => "NOTIFY_IN",
        PresenceOut => "PRESENCE_OUT",
        PresenceProbe => "PRESENCE_PROBE",
        MessageWaiting => "MESSAGE_WAITING",
        MessageQuery => "MESSAGE_QUERY",
        Roster => "ROSTER",
        Codec => "CODEC",
        BackgroundJob => "BACKGROUND_JOB",
        DetectedSpeech => "DETECTED_SPEECH",
        DetectedTone => "DETECTED_TONE",
        PrivateCommand => "PRIVATE_COMMAND",
        Heartbeat => "HEARTBEAT",
        Trap => "TRAP",
        AddSchedule => "ADD_SCHEDULE",
        DelSchedule => "DEL_SCHEDULE",
        ExeSchedule => "EXE_SCHEDULE",
        ReSchedule => "RE_SCHEDULE",
        ReloadXml => "RELOADXML",
        Notify => "NOTIFY",
        PhoneFeature => "PHONE_FEATURE",
        PhoneFeatureSubscribe => "PHONE_FEATURE_SUBSCRIBE",
        SendMessage => "SEND_MESSAGE",
        RecvMessage => "RECV_MESSAGE",
        RequestParams => "REQUEST_PARAMS",
        ChannelData => "CHANNEL_DATA",
        General => "GENERAL",
        Command => "COMMAND",
        SessionHeartbeat => "SESSION_HEARTBEAT",
        ClientDisconnected => "CLIENT_DISCONNECTED",
        ServerDisconnected => "SERVER_DISCONNECTED",
        SendInfo => "SEND_INFO",
        RecvInfo => "RECV_INFO",
        CallSecure => "CALL_SECURE",
        Nat => "NAT",
        RecordStart => "RECORD_START",
        RecordStop => "RECORD_STOP",
        PlaybackStart => "PLAYBACK_START",
        PlaybackStop => "PLAYBACK_STOP",
        CallUpdate => "CALL_UPDATE",
        Failure => "FAILURE",
        SocketData => "SOCKET_DATA",
        MediaBugStart => "MEDIA_BUG_START",
        MediaBugStop => "MEDIA_BUG_STOP",
        CallDetail => "CALL_DETAIL",
        DeviceState => "DEVICE_STATE",
        Text => "TEXT",
        ShutdownRequested => "SHUTDOWN_REQUESTED",
        /// Subscribe to all events
        All => "ALL",
    }
}

/// One event, viewed through the sub-encoding its frame uses.
///
/// `text/event-plain` events carry their fields as `Name: value` lines in
/// the frame body; everything else (notably the listen-in `connect` reply)
/// carries them as frame headers. The two variants implement field lookup
/// differently; the body view re-parses the body on every lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EslEvent {
    /// Fields are the frame headers, `variable_<name>` as fallback.
    HeadersOnly(Frame),
    /// Fields are header lines in the frame body, up to the first blank line.
    BodyEncoded(Frame),
}

impl EslEvent {
    /// Pick the view from the frame's content type.
    pub fn from_frame(frame: Frame) -> Self {
        match frame.content_type() {
            Some(ContentType::EventPlain) => EslEvent::BodyEncoded(frame),
            _ => EslEvent::HeadersOnly(frame),
        }
    }

    pub fn frame(&self) -> &Frame {
        match self {
            EslEvent::HeadersOnly(f) | EslEvent::BodyEncoded(f) => f,
        }
    }

    pub fn into_frame(self) -> Frame {
        match self {
            EslEvent::HeadersOnly(f) | EslEvent::BodyEncoded(f) => f,
        }
    }

    /// Field lines of a body-encoded event, stopping at the first blank line.
    fn body_field_lines(frame: &Frame) -> impl Iterator<Item = &str> {
        frame
            .body_lines()
            .iter()
            .map(|l| l.trim_end_matches('\r'))
            .take_while(|l| !l.is_empty())
    }

    /// Look up one field by exact name.
    pub fn field(&self, name: impl AsRef<str>) -> Option<Cow<'_, str>> {
        let name = name.as_ref();
        match self {
            EslEvent::HeadersOnly(frame) => frame
                .header(name)
                .or_else(|| frame.header(format!("{}{}", VARIABLE_PREFIX, name)))
                .map(Cow::Borrowed),
            EslEvent::BodyEncoded(frame) => Self::body_field_lines(frame)
                .filter(|l| has_header_separator(l))
                .map(parse_header_line)
                .find(|(n, _)| *n == name)
                .map(|(_, v)| decode_value(v)),
        }
    }

    /// Every field, in wire order for body-encoded events.
    pub fn fields(&self) -> Vec<(Cow<'_, str>, Cow<'_, str>)> {
        match self {
            EslEvent::HeadersOnly(frame) => frame
                .headers()
                .iter()
                .map(|(k, v)| (Cow::Borrowed(k.as_str()), Cow::Borrowed(v.as_str())))
                .collect(),
            EslEvent::BodyEncoded(frame) => Self::body_field_lines(frame)
                .filter(|l| has_header_separator(l))
                .map(parse_header_line)
                .map(|(n, v)| (Cow::Borrowed(n), decode_value(v)))
                .collect(),
        }
    }

    /// Payload following the field block (e.g. a `BACKGROUND_JOB` result).
    pub fn inner_body(&self) -> Option<String> {
        let body = match self {
            EslEvent::HeadersOnly(frame) => frame.body()?,
            EslEvent::BodyEncoded(frame) => {
                let lines = frame.body_lines();
                let start = lines
                    .iter()
                    .position(|l| l.trim_end_matches('\r').is_empty())?;
                lines[start + 1..].join("\n")
            }
        };
        if body.is_empty() {
            None
        } else {
            Some(body)
        }
    }

    /// `variable_<name>` channel variable.
    pub fn variable(&self, name: &str) -> Option<Cow<'_, str>> {
        self.field(format!("{}{}", VARIABLE_PREFIX, name))
    }

    pub fn event_name(&self) -> Option<Cow<'_, str>> {
        self.field(EventHeader::EventName)
    }

    /// Parsed `Event-Name`, `None` when absent or not a known name.
    pub fn event_type(&self) -> Option<EslEventType> {
        self.event_name()
            .and_then(|n| n.parse().ok())
    }

    pub fn is_event_type(&self, event_type: EslEventType) -> bool {
        self.event_type() == Some(event_type)
    }

    pub fn event_subclass(&self) -> Option<Cow<'_, str>> {
        self.field(EventHeader::EventSubclass)
    }

    pub fn unique_id(&self) -> Option<Cow<'_, str>> {
        self.field(EventHeader::UniqueId)
            .or_else(|| self.field(EventHeader::CallerUniqueId))
    }

    pub fn job_uuid(&self) -> Option<Cow<'_, str>> {
        self.field(EventHeader::JobUuid)
    }

    pub fn channel_name(&self) -> Option<Cow<'_, str>> {
        self.field(EventHeader::ChannelName)
    }

    pub fn caller_id_number(&self) -> Option<Cow<'_, str>> {
        self.field(EventHeader::CallerCallerIdNumber)
    }

    pub fn caller_id_name(&self) -> Option<Cow<'_, str>> {
        self.field(EventHeader::CallerCallerIdName)
    }

    pub fn destination_number(&self) -> Option<Cow<'_, str>> {
        self.field(EventHeader::CallerDestinationNumber)
    }

    pub fn hangup_cause(&self) -> Option<Cow<'_, str>> {
        self.field(EventHeader::HangupCause)
    }

    pub fn channel_state(&self) -> Option<ChannelState> {
        self.field(EventHeader::ChannelState)
            .and_then(|s| s.parse().ok())
    }

    pub fn channel_state_number(&self) -> Option<ChannelState> {
        self.field(EventHeader::ChannelStateNumber)
            .and_then(|s| s.parse::<u8>().ok())
            .and_then(ChannelState::from_number)
    }

    pub fn call_state(&self) -> Option<CallState> {
        self.field(EventHeader::ChannelCallState)
            .and_then(|s| s.parse().ok())
    }

    pub fn answer_state(&self) -> Option<AnswerState> {
        self.field(EventHeader::AnswerState)
            .and_then(|s| s.parse().ok())
    }

    pub fn call_direction(&self) -> Option<CallDirection> {
        self.field(EventHeader::CallDirection)
            .and_then(|s| s.parse().ok())
    }
}

/// Builds a [`TypedEvent`] from a generic event.
pub type EventConstructor = fn(EslEvent) -> TypedEvent;

macro_rules! typed_events {
    (
        $(
            $(#[$meta:meta])*
            $variant:ident($wrapper:ident)
        ),+ $(,)?
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, Eq)]
            pub struct $wrapper(EslEvent);

            impl $wrapper {
                pub fn new(event: EslEvent) -> Self {
                    Self(event)
                }

                /// Registry constructor for this variant.
                pub fn typed(event: EslEvent) -> TypedEvent {
                    TypedEvent::$variant(Self(event))
                }

                pub fn into_event(self) -> EslEvent {
                    self.0
                }
            }

            impl Deref for $wrapper {
                type Target = EslEvent;

                fn deref(&self) -> &EslEvent {
                    &self.0
                }
            }
        )+

        /// Closed set of events with typed accessors.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum TypedEvent {
            $( $variant($wrapper), )+
        }

        impl TypedEvent {
            /// The variant's canonical event type (aliases registered under
            /// other names still report this one).
            pub fn event_type(&self) -> EslEventType {
                match self {
                    $( TypedEvent::$variant(_) => EslEventType::$variant, )+
                }
            }

            pub fn event(&self) -> &EslEvent {
                match self {
                    $( TypedEvent::$variant(e) => &e.0, )+
                }
            }

            pub fn into_event(self) -> EslEvent {
                match self {
                    $( TypedEvent::$variant(e) => e.0, )+
                }
            }
        }

        fn builtin_constructors() -> Vec<(EslEventType, EventConstructor)> {
            vec![ $( (EslEventType::$variant, $wrapper::typed as EventConstructor), )+ ]
        }
    };
}

typed_events! {
    BackgroundJob(BackgroundJobEvent),
    ChannelCreate(ChannelCreateEvent),
    ChannelDestroy(ChannelDestroyEvent),
    ChannelState(ChannelStateEvent),
    ChannelCallstate(ChannelCallstateEvent),
    ChannelAnswer(ChannelAnswerEvent),
    ChannelHangup(ChannelHangupEvent),
    ChannelHangupComplete(ChannelHangupCompleteEvent),
    ChannelExecute(ChannelExecuteEvent),
    ChannelExecuteComplete(ChannelExecuteCompleteEvent),
    ChannelBridge(ChannelBridgeEvent),
    ChannelUnbridge(ChannelUnbridgeEvent),
    ChannelPark(ChannelParkEvent),
    ChannelUnpark(ChannelUnparkEvent),
    ChannelProgress(ChannelProgressEvent),
    ChannelProgressMedia(ChannelProgressMediaEvent),
    ChannelOriginate(ChannelOriginateEvent),
    Dtmf(DtmfEvent),
    Heartbeat(HeartbeatEvent),
    Custom(CustomEvent),
    PlaybackStart(PlaybackStartEvent),
    PlaybackStop(PlaybackStopEvent),
    RecordStart(RecordStartEvent),
    RecordStop(RecordStopEvent),
}

impl BackgroundJobEvent {
    pub fn job_uuid(&self) -> Option<Cow<'_, str>> {
        self.0
            .job_uuid()
    }

    pub fn job_command(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::JobCommand)
    }

    pub fn job_command_arg(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::JobCommandArg)
    }

    /// The api output of the job.
    pub fn result(&self) -> Option<String> {
        self.0
            .inner_body()
    }
}

impl ChannelCallstateEvent {
    pub fn original_call_state(&self) -> Option<CallState> {
        self.0
            .field(EventHeader::OriginalChannelCallState)
            .and_then(|s| s.parse().ok())
    }
}

impl ChannelExecuteEvent {
    pub fn application(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::Application)
    }

    pub fn application_data(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::ApplicationData)
    }
}

impl ChannelExecuteCompleteEvent {
    pub fn application(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::Application)
    }

    pub fn application_response(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::ApplicationResponse)
    }

    /// Matches the `Event-UUID` given when the application was executed.
    pub fn application_uuid(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::ApplicationUuid)
    }
}

impl ChannelBridgeEvent {
    pub fn other_leg_unique_id(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::OtherLegUniqueId)
            .or_else(|| {
                self.0
                    .field(EventHeader::BridgeBUniqueId)
            })
    }
}

impl DtmfEvent {
    pub fn digit(&self) -> Option<char> {
        self.0
            .field(EventHeader::DtmfDigit)
            .and_then(|d| d.chars().next())
    }

    /// Duration in samples.
    pub fn duration(&self) -> Option<u32> {
        self.0
            .field(EventHeader::DtmfDuration)
            .and_then(|d| d.parse().ok())
    }

    pub fn source(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::DtmfSource)
    }
}

impl HeartbeatEvent {
    pub fn core_uuid(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::CoreUuid)
    }

    pub fn up_time(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::UpTime)
    }

    pub fn session_count(&self) -> Option<u64> {
        self.0
            .field(EventHeader::SessionCount)
            .and_then(|s| s.parse().ok())
    }
}

impl CustomEvent {
    pub fn subclass(&self) -> Option<Cow<'_, str>> {
        self.0
            .event_subclass()
    }
}

impl PlaybackStartEvent {
    pub fn file_path(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::PlaybackFilePath)
    }
}

impl PlaybackStopEvent {
    pub fn file_path(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::PlaybackFilePath)
    }
}

impl RecordStartEvent {
    pub fn file_path(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::RecordFilePath)
    }
}

impl RecordStopEvent {
    pub fn file_path(&self) -> Option<Cow<'_, str>> {
        self.0
            .field(EventHeader::RecordFilePath)
    }
}

/// Outcome of [`EventRegistry::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Typed(TypedEvent),
    /// No constructor registered for the event name.
    Unhandled(EslEvent),
}

/// Maps exact `Event-Name` values to typed constructors.
#[derive(Clone)]
pub struct EventRegistry {
    constructors: HashMap<String, EventConstructor>,
}

impl EventRegistry {
    /// A registry with no names at all; every event is unhandled.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Map `name` to `constructor`, replacing any previous mapping.
    ///
    /// ```
    /// use esl_engine::{event::DtmfEvent, EventRegistry};
    ///
    /// let registry = EventRegistry::default().register("DTMF_LEGACY", DtmfEvent::typed);
    /// assert!(registry.contains("DTMF_LEGACY"));
    /// ```
    pub fn register(mut self, name: impl Into<String>, constructor: EventConstructor) -> Self {
        self.constructors
            .insert(name.into(), constructor);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.constructors
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors
            .is_empty()
    }

    /// Exact, case-sensitive match on `Event-Name`.
    pub fn classify(&self, event: EslEvent) -> Classified {
        let constructor = event
            .event_name()
            .and_then(|name| {
                self.constructors
                    .get(&*name)
                    .copied()
            });
        match constructor {
            Some(constructor) => Classified::Typed(constructor(event)),
            None => Classified::Unhandled(event),
        }
    }

    pub fn classify_frame(&self, frame: Frame) -> Classified {
        self.classify(EslEvent::from_frame(frame))
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        builtin_constructors()
            .into_iter()
            .fold(Self::empty(), |registry, (event_type, constructor)| {
                registry.register(event_type.as_str(), constructor)
            })
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self
            .constructors
            .keys()
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        f.debug_struct("EventRegistry")
            .field("names", &names)
            .finish()
    }
}
