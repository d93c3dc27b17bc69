//! Command serialization.

use crate::{command::Command, constants::HEADER_TERMINATOR};

/// Stateless encoder turning a [`Command`] into wire bytes.
///
/// Holds no state, so one instance can be shared by every connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEncoder;

impl FrameEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Render `"<name> <argument>"`, trimmed and closed by a blank line.
    ///
    /// Returns an empty buffer when the command renders to nothing.
    pub fn encode(&self, command: &Command) -> Vec<u8> {
        let rendered = format!("{} {}", command.name(), command.argument());
        let mut text = rendered
            .trim()
            .to_string();
        if text.is_empty() {
            return Vec::new();
        }
        if !text.ends_with(HEADER_TERMINATOR) {
            text.push_str(HEADER_TERMINATOR);
        }
        text.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::EslCommand, decoder::FrameDecoder, headers::parse_header_line};

    #[test]
    fn test_encode_auth() {
        let bytes = FrameEncoder.encode(&Command::new("auth", "ClueCon"));
        assert_eq!(bytes, b"auth ClueCon\n\n");
        assert_eq!(bytes.len(), "auth ClueCon\n\n".len());
    }

    #[test]
    fn test_encode_round_trip_through_decoder() {
        let command = Command::new("auth", "ClueCon");
        let mut decoder = FrameDecoder::new(crate::decoder::DecoderConfig::lenient());
        decoder
            .feed(&FrameEncoder.encode(&command))
            .unwrap();
        let frame = decoder
            .decode()
            .unwrap()
            .unwrap();

        // "auth ClueCon" has no colon, so it lands in the body untouched.
        let line = &frame.body_lines()[0];
        let (name, argument) = line
            .split_once(' ')
            .unwrap();
        assert_eq!(name, command.name());
        assert_eq!(argument, command.argument());
        assert_eq!(parse_header_line(line), ("auth ClueCon", ""));
    }

    #[test]
    fn test_encode_without_argument() {
        assert_eq!(FrameEncoder.encode(&Command::new("exit", "")), b"exit\n\n");
        assert_eq!(
            FrameEncoder.encode(&Command::new("  resume ", "  ")),
            b"resume\n\n"
        );
    }

    #[test]
    fn test_encode_empty_command() {
        assert!(FrameEncoder
            .encode(&Command::new("", "   "))
            .is_empty());
    }

    #[test]
    fn test_encode_multiline_sendmsg() {
        let command = EslCommand::Execute {
            app: "answer".into(),
            args: None,
            uuid: None,
        }
        .to_command()
        .unwrap();
        assert_eq!(
            FrameEncoder.encode(&command),
            b"sendmsg \ncall-command: execute\nexecute-app-name: answer\n\n"
        );
    }
}
