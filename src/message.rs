//! Wire-format parsing for lines exchanged with the chat server.
//!
//! Lines follow the IRCv3 grammar Twitch uses:
//! `['@' tags SP] [':' prefix SP] command (SP middle)* [SP ':' trailing]`,
//! terminated by CRLF.

use crate::tags::Tags;

/// Line terminator required by the chat servers.
pub(crate) const CRLF: &str = "\r\n";

/// One message parsed off the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Origin of the message, without the leading `:`. Empty if absent.
    pub prefix: String,

    /// Command name or three-digit numeric reply.
    ///
    /// Empty means the line was malformed and should be skipped.
    pub command: String,

    /// Positional parameters. The last one may contain spaces when the
    /// server sent it as a `:`-introduced trailer.
    pub parameters: Vec<String>,

    /// Tags carried in the `@`-prefixed preamble, if any.
    pub tags: Tags,
}

/// Removes the next CRLF-terminated line from `buffer` and returns it
/// without its terminator. Returns `None`, leaving the buffer untouched,
/// when no complete line has arrived yet.
pub(crate) fn take_line(buffer: &mut String) -> Option<String> {
    let end = buffer.find(CRLF)?;
    let line = buffer[..end].to_string();
    buffer.replace_range(..end + CRLF.len(), "");
    Some(line)
}

impl Message {
    /// Extracts and parses the next complete line from `buffer`.
    ///
    /// Consumes exactly one CRLF-terminated prefix of the buffer, or nothing
    /// when the buffer holds no complete line.
    pub fn parse(buffer: &mut String) -> Option<Message> {
        take_line(buffer).map(|line| Message::from_line(&line))
    }

    /// Parses a single line (without its CRLF terminator).
    pub fn from_line(line: &str) -> Message {
        enum State {
            LineFirstCharacter,
            Tags,
            PrefixOrCommandFirstCharacter,
            Prefix,
            CommandFirstCharacter,
            CommandNotFirstCharacter,
            ParameterFirstCharacter,
            ParameterNotFirstCharacter,
            Trailer,
        }

        let mut state = State::LineFirstCharacter;
        let mut message = Message::default();
        let mut unparsed_tags = String::new();
        for ch in line.chars() {
            state = match state {
                State::LineFirstCharacter => {
                    if ch == '@' {
                        State::Tags
                    } else if ch == ':' {
                        State::Prefix
                    } else {
                        message.command.push(ch);
                        State::CommandNotFirstCharacter
                    }
                }
                State::Tags => {
                    if ch == ' ' {
                        State::PrefixOrCommandFirstCharacter
                    } else {
                        unparsed_tags.push(ch);
                        State::Tags
                    }
                }
                State::PrefixOrCommandFirstCharacter => {
                    if ch == ':' {
                        State::Prefix
                    } else {
                        message.command.push(ch);
                        State::CommandNotFirstCharacter
                    }
                }
                State::Prefix => {
                    if ch == ' ' {
                        State::CommandFirstCharacter
                    } else {
                        message.prefix.push(ch);
                        State::Prefix
                    }
                }
                State::CommandFirstCharacter => {
                    if ch == ' ' {
                        State::CommandFirstCharacter
                    } else {
                        message.command.push(ch);
                        State::CommandNotFirstCharacter
                    }
                }
                State::CommandNotFirstCharacter => {
                    if ch == ' ' {
                        State::ParameterFirstCharacter
                    } else {
                        message.command.push(ch);
                        State::CommandNotFirstCharacter
                    }
                }
                State::ParameterFirstCharacter => {
                    if ch == ':' {
                        message.parameters.push(String::new());
                        State::Trailer
                    } else if ch == ' ' {
                        State::ParameterFirstCharacter
                    } else {
                        message.parameters.push(ch.to_string());
                        State::ParameterNotFirstCharacter
                    }
                }
                State::ParameterNotFirstCharacter => {
                    if ch == ' ' {
                        State::ParameterFirstCharacter
                    } else {
                        if let Some(last) = message.parameters.last_mut() {
                            last.push(ch);
                        }
                        State::ParameterNotFirstCharacter
                    }
                }
                State::Trailer => {
                    if let Some(last) = message.parameters.last_mut() {
                        last.push(ch);
                    }
                    State::Trailer
                }
            };
        }

        // A line that ran out before the command completed carries no
        // usable command.
        if matches!(
            state,
            State::LineFirstCharacter
                | State::Tags
                | State::PrefixOrCommandFirstCharacter
                | State::Prefix
                | State::CommandFirstCharacter
        ) {
            message.command.clear();
        }
        message.tags = Tags::parse(&unparsed_tags);
        message
    }
}
