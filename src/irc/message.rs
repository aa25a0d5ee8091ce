/// IRC message parsing and serialization.
///
/// Implements the RFC 1459 message format:
///   [`:`prefix SPACE] command [SPACE params] [SPACE `:` trailing]
///
/// Messages are terminated by CR-LF (`\r\n`) on the wire, but parsing
/// operates on the content without the terminator.
use std::fmt;

/// Maximum payload length of one message, excluding the CR-LF terminator.
pub const MAX_LINE_LEN: usize = 510;

/// Maximum number of parameters one message may carry.
pub const MAX_PARAMS: usize = 15;

/// A parsed IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Optional prefix (server name or `nick!user@host`).
    pub prefix: Option<String>,
    /// The command, uppercased (e.g. `PRIVMSG`, `001`, `NICK`).
    pub command: String,
    /// Parameters — the last may have been a trailing param (with spaces).
    pub params: Vec<String>,
}

/// Errors that can occur during message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty message")]
    Empty,
    #[error("message exceeds {MAX_LINE_LEN} bytes")]
    TooLong,
    #[error("message must not start with a space")]
    LeadingSpace,
    #[error("prefix present but missing command")]
    MissingCommand,
    #[error("empty prefix")]
    EmptyPrefix,
    #[error("command must be letters or exactly three digits")]
    BadCommand,
    #[error("too many parameters (max {MAX_PARAMS})")]
    TooManyParams,
    #[error("parameter contains NUL, CR or LF")]
    BadParamByte,
}

/// A command is a run of ASCII letters or exactly three ASCII digits.
fn is_valid_command(command: &str) -> bool {
    if command.len() == 3 && command.bytes().all(|b| b.is_ascii_digit()) {
        return true;
    }
    !command.is_empty() && command.bytes().all(|b| b.is_ascii_alphabetic())
}

impl Message {
    /// Build a message with no prefix.
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Build a message carrying a prefix.
    pub fn with_prefix(
        prefix: impl Into<String>,
        command: impl Into<String>,
        params: Vec<String>,
    ) -> Self {
        Self {
            prefix: Some(prefix.into()),
            command: command.into(),
            params,
        }
    }

    /// Parse a single IRC message from a line (without the trailing `\r\n`).
    ///
    /// The command is uppercased; parameter bytes are preserved verbatim.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty);
        }
        if input.len() > MAX_LINE_LEN {
            return Err(ParseError::TooLong);
        }
        if input.starts_with(' ') {
            return Err(ParseError::LeadingSpace);
        }

        let (prefix, rest) = if let Some(after_colon) = input.strip_prefix(':') {
            match after_colon.find(' ') {
                Some(idx) => {
                    let prefix = &after_colon[..idx];
                    if prefix.is_empty() {
                        return Err(ParseError::EmptyPrefix);
                    }
                    (
                        Some(prefix.to_owned()),
                        after_colon[idx + 1..].trim_start_matches(' '),
                    )
                }
                None => return Err(ParseError::MissingCommand),
            }
        } else {
            (None, input)
        };

        if rest.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        // Split into command and parameter portion.
        let (command, param_str) = match rest.find(' ') {
            Some(idx) => (&rest[..idx], Some(rest[idx + 1..].trim_start_matches(' '))),
            None => (rest, None),
        };

        if !is_valid_command(command) {
            return Err(ParseError::BadCommand);
        }

        let mut params = Vec::new();

        if let Some(mut remaining) = param_str {
            while !remaining.is_empty() {
                if params.len() == MAX_PARAMS {
                    return Err(ParseError::TooManyParams);
                }
                if let Some(trailing) = remaining.strip_prefix(':') {
                    // Trailing parameter: the rest of the line, verbatim.
                    params.push(trailing.to_owned());
                    break;
                }
                match remaining.find(' ') {
                    Some(idx) => {
                        params.push(remaining[..idx].to_owned());
                        remaining = remaining[idx + 1..].trim_start_matches(' ');
                    }
                    None => {
                        params.push(remaining.to_owned());
                        break;
                    }
                }
            }
        }

        for param in &params {
            if param.bytes().any(|b| b == 0 || b == b'\r' || b == b'\n') {
                return Err(ParseError::BadParamByte);
            }
        }

        Ok(Message {
            prefix,
            command: command.to_ascii_uppercase(),
            params,
        })
    }

    /// Serialize to the IRC wire format (without trailing `\r\n`).
    ///
    /// The last parameter is written as a trailing parameter exactly when
    /// it has to be: it contains a space, is empty, or starts with `:`.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();

        if let Some(ref prefix) = self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }

        out.push_str(&self.command);

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                out.push(' ');
                out.push_str(param);
            }
            out.push(' ');
            if last.is_empty() || last.starts_with(':') || last.contains(' ') {
                out.push(':');
            }
            out.push_str(last);
        }

        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}
