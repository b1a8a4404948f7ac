//! Wire codec for the line-oriented protocol.
//!
//! An [`Atoms`] is the intermediate form of one protocol line:
//! optional prefix, command, positional params, optional trailing param.
//! It exists only at the codec boundary — connections decode lines into
//! atoms, the message model decides what they mean.

use std::fmt;

/// Decode failure for a single protocol line.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty line")]
    EmptyLine,
    #[error("line has a prefix but no command")]
    MissingCommand,
}

/// One decoded protocol line.
///
/// `trailing`, when present, may contain spaces and is always the last
/// logical field on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atoms {
    pub prefix: String,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl Atoms {
    pub fn new(prefix: &str, command: &str, params: Vec<&str>, trailing: Option<&str>) -> Self {
        Self {
            prefix: prefix.to_string(),
            command: command.to_string(),
            params: params.into_iter().map(|s| s.to_string()).collect(),
            trailing: trailing.map(|s| s.to_string()),
        }
    }

    /// Parse one raw line (CR/LF stripped if present) into atoms.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(DecodeError::EmptyLine);
        }

        let mut rest = line;

        let prefix = if let Some(after) = rest.strip_prefix(':') {
            let (pfx, tail) = split_token(after);
            if tail.is_empty() {
                return Err(DecodeError::MissingCommand);
            }
            rest = tail;
            pfx.to_string()
        } else {
            String::new()
        };

        let (command, mut rest) = split_token(rest);
        if command.is_empty() {
            return Err(DecodeError::MissingCommand);
        }

        let mut params = Vec::new();
        let mut trailing = None;
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix(':') {
                trailing = Some(tail.to_string());
                break;
            }
            let (param, tail) = split_token(rest);
            params.push(param.to_string());
            rest = tail;
        }

        Ok(Atoms {
            prefix,
            command: command.to_string(),
            params,
            trailing,
        })
    }

    /// Serialize back to a CRLF-terminated wire line.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Atoms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.prefix.is_empty() {
            write!(f, ":{} ", self.prefix)?;
        }
        write!(f, "{}", self.command)?;
        for param in &self.params {
            write!(f, " {param}")?;
        }
        if let Some(ref trailing) = self.trailing {
            write!(f, " :{trailing}")?;
        }
        write!(f, "\r\n")
    }
}

/// Split off the first space-delimited token, returning (token, rest).
fn split_token(input: &str) -> (&str, &str) {
    match input.split_once(' ') {
        Some((head, tail)) => (head, tail.trim_start_matches(' ')),
        None => (input, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_simple_command() {
        let atoms = Atoms::decode("NICK test").unwrap();
        assert_eq!(atoms.prefix, "");
        assert_eq!(atoms.command, "NICK");
        assert_eq!(atoms.params, vec!["test"]);
        assert_eq!(atoms.trailing, None);
    }

    #[test]
    fn decode_with_prefix_and_trailing() {
        let atoms = Atoms::decode(":server 001 alice :Welcome home").unwrap();
        assert_eq!(atoms.prefix, "server");
        assert_eq!(atoms.command, "001");
        assert_eq!(atoms.params, vec!["alice"]);
        assert_eq!(atoms.trailing.as_deref(), Some("Welcome home"));
    }

    #[test]
    fn trailing_keeps_embedded_spaces_and_colons() {
        let atoms = Atoms::decode("PRIVMSG #chan :hello :) world").unwrap();
        assert_eq!(atoms.params, vec!["#chan"]);
        assert_eq!(atoms.trailing.as_deref(), Some("hello :) world"));
    }

    #[test]
    fn no_trailing_marker_means_absent() {
        let atoms = Atoms::decode("JOIN #chan").unwrap();
        assert_eq!(atoms.trailing, None);
    }

    #[test]
    fn empty_trailing_is_empty_string() {
        let atoms = Atoms::decode("QUIT :").unwrap();
        assert_eq!(atoms.trailing.as_deref(), Some(""));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(Atoms::decode(""), Err(DecodeError::EmptyLine));
        assert_eq!(Atoms::decode("\r\n"), Err(DecodeError::EmptyLine));
        assert_eq!(Atoms::decode(":prefix"), Err(DecodeError::MissingCommand));
    }

    #[test]
    fn encode_full_line() {
        let atoms = Atoms::new("prefix", "command", vec!["param1", "param2"], Some("param3"));
        assert_eq!(atoms.encode(), ":prefix command param1 param2 :param3\r\n");
    }

    #[test]
    fn encode_without_prefix() {
        let atoms = Atoms::new("", "command", vec!["param1"], None);
        assert_eq!(atoms.encode(), "command param1\r\n");
    }

    #[test]
    fn encode_trailing_with_spaces() {
        let atoms = Atoms::new("prefix", "command", vec![], Some("one two three"));
        assert_eq!(atoms.encode(), ":prefix command :one two three\r\n");
    }

    #[test]
    fn round_trip() {
        let atoms = Atoms::new("nick!user@host", "PRIVMSG", vec!["#chan"], Some("hi there"));
        assert_eq!(Atoms::decode(&atoms.encode()).unwrap(), atoms);
    }
}
