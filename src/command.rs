//! Outgoing commands and a catalog of the common ones.
//!
//! On the wire every command is `<name> <argument>` followed by a blank
//! line. Multi-line commands such as `sendmsg` carry their extra
//! `Name: value` lines inside the argument text.

use crate::{
    constants::LINE_TERMINATOR,
    error::{EslError, EslResult},
    event::{EslEventType, EventFormat},
};
use std::fmt;

/// Reject user-provided fields containing newlines.
///
/// Commands are line-delimited; an embedded newline would let a caller
/// inject arbitrary protocol commands.
fn validate_no_newlines(s: &str, context: &str) -> EslResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(EslError::invalid_command(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// A command ready for the encoder: `{name, argument}`.
///
/// The optional token is bookkeeping for the caller (it shows up in logs and
/// on [`PendingReply`](crate::PendingReply)); replies are matched purely by
/// send order.
#[derive(Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    argument: String,
    token: Option<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: argument.into(),
            token: None,
        }
    }

    /// Attach a correlation token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argument(&self) -> &str {
        &self.argument
    }

    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
    }

    pub(crate) fn set_token_if_absent(&mut self, token: impl FnOnce() -> String) {
        if self
            .token
            .is_none()
        {
            self.token = Some(token());
        }
    }

    /// Credentials must never reach the logs.
    pub(crate) fn is_sensitive(&self) -> bool {
        matches!(self.name.as_str(), "auth" | "userauth")
    }

    /// Log-safe rendering of the command line.
    pub(crate) fn log_line(&self) -> String {
        if self.is_sensitive() {
            return format!("{} [REDACTED]", self.name);
        }
        let first_line = self
            .argument
            .lines()
            .next()
            .unwrap_or("");
        format!("{} {}", self.name, first_line)
            .trim()
            .to_string()
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let argument: &str = if self.is_sensitive() {
            "[REDACTED]"
        } else {
            &self.argument
        };
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("argument", &argument)
            .field("token", &self.token)
            .finish()
    }
}

/// Catalog of socket commands used by the sessions and by most applications.
#[derive(Clone)]
pub enum EslCommand {
    /// Authenticate with password
    Auth { password: String },
    /// Authenticate with user and password
    UserAuth { user: String, password: String },
    /// Execute API command (blocking)
    Api { command: String },
    /// Execute background API command
    BgApi { command: String },
    /// Subscribe to events
    Events {
        format: EventFormat,
        events: Vec<EslEventType>,
    },
    /// Unsubscribe from specific events
    NixEvent { events: Vec<EslEventType> },
    /// Unsubscribe from all events
    NoEvents,
    /// Add an event filter
    Filter { header: String, value: String },
    /// Subscribe to the attached channel's events (uuid for dial-out use)
    MyEvents {
        format: EventFormat,
        uuid: Option<String>,
    },
    /// Redirect session events to the socket
    DivertEvents { on: bool },
    /// Keep socket open after channel hangup
    Linger { timeout: Option<u32> },
    /// Cancel linger mode
    NoLinger,
    /// Resume dialplan execution on socket disconnect
    Resume,
    /// First command of a listen-in connection
    Connect,
    /// Run a dialplan application on a channel (via `sendmsg`)
    Execute {
        app: String,
        args: Option<String>,
        uuid: Option<String>,
    },
    /// Hang up a channel (via `sendmsg`)
    Hangup {
        cause: Option<String>,
        uuid: Option<String>,
    },
    /// Read a channel variable
    GetVar { name: String },
    /// Close the session
    Exit,
}

impl fmt::Debug for EslCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EslCommand::Auth { .. } => f
                .debug_struct("Auth")
                .field("password", &"[REDACTED]")
                .finish(),
            EslCommand::UserAuth { user, .. } => f
                .debug_struct("UserAuth")
                .field("user", user)
                .field("password", &"[REDACTED]")
                .finish(),
            other => match other.to_command() {
                Ok(command) => write!(f, "EslCommand({})", command.log_line()),
                Err(_) => write!(f, "EslCommand(<invalid>)"),
            },
        }
    }
}

fn event_list(events: &[EslEventType]) -> String {
    if events.contains(&EslEventType::All) {
        return EslEventType::All.to_string();
    }
    events
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `sendmsg [uuid]` with its header lines folded into the argument.
fn sendmsg(uuid: Option<&str>, lines: &[(&str, &str)]) -> EslResult<Command> {
    let mut argument = String::new();
    if let Some(uuid) = uuid {
        validate_no_newlines(uuid, "sendmsg uuid")?;
        argument.push_str(uuid);
    }
    for (name, value) in lines {
        validate_no_newlines(value, name)?;
        argument.push_str(LINE_TERMINATOR);
        argument.push_str(name);
        argument.push_str(": ");
        argument.push_str(value);
    }
    Ok(Command::new("sendmsg", argument))
}

impl EslCommand {
    /// Validate user-supplied fields and render the `{name, argument}` pair.
    pub fn to_command(&self) -> EslResult<Command> {
        match self {
            EslCommand::Auth { password } => {
                validate_no_newlines(password, "password")?;
                Ok(Command::new("auth", password.as_str()))
            }
            EslCommand::UserAuth { user, password } => {
                validate_no_newlines(user, "user")?;
                validate_no_newlines(password, "password")?;
                Ok(Command::new("userauth", format!("{}:{}", user, password)))
            }
            EslCommand::Api { command } => {
                validate_no_newlines(command, "api command")?;
                Ok(Command::new("api", command.as_str()))
            }
            EslCommand::BgApi { command } => {
                validate_no_newlines(command, "bgapi command")?;
                Ok(Command::new("bgapi", command.as_str()))
            }
            EslCommand::Events { format, events } => Ok(Command::new(
                "event",
                format!("{} {}", format, event_list(events)),
            )),
            EslCommand::NixEvent { events } => Ok(Command::new("nixevent", event_list(events))),
            EslCommand::NoEvents => Ok(Command::new("noevents", "")),
            EslCommand::Filter { header, value } => {
                validate_no_newlines(header, "filter header")?;
                validate_no_newlines(value, "filter value")?;
                Ok(Command::new("filter", format!("{} {}", header, value)))
            }
            EslCommand::MyEvents { format, uuid } => Ok(match uuid {
                Some(u) => {
                    validate_no_newlines(u, "myevents uuid")?;
                    Command::new("myevents", format!("{} {}", u, format))
                }
                None => Command::new("myevents", format.to_string()),
            }),
            EslCommand::DivertEvents { on } => {
                Ok(Command::new("divert_events", if *on { "on" } else { "off" }))
            }
            EslCommand::Linger { timeout } => Ok(Command::new(
                "linger",
                timeout
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
            )),
            EslCommand::NoLinger => Ok(Command::new("nolinger", "")),
            EslCommand::Resume => Ok(Command::new("resume", "")),
            EslCommand::Connect => Ok(Command::new("connect", "")),
            EslCommand::Execute { app, args, uuid } => {
                validate_no_newlines(app, "execute app")?;
                let mut lines = vec![("call-command", "execute"), ("execute-app-name", app.as_str())];
                if let Some(args) = args {
                    lines.push(("execute-app-arg", args.as_str()));
                }
                sendmsg(uuid.as_deref(), &lines)
            }
            EslCommand::Hangup { cause, uuid } => {
                let mut lines = vec![("call-command", "hangup")];
                if let Some(cause) = cause {
                    lines.push(("hangup-cause", cause.as_str()));
                }
                sendmsg(uuid.as_deref(), &lines)
            }
            EslCommand::GetVar { name } => {
                validate_no_newlines(name, "getvar name")?;
                Ok(Command::new("getvar", name.as_str()))
            }
            EslCommand::Exit => Ok(Command::new("exit", "")),
        }
    }
}

impl TryFrom<EslCommand> for Command {
    type Error = EslError;

    fn try_from(command: EslCommand) -> EslResult<Self> {
        command.to_command()
    }
}
