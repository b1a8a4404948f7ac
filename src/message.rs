//! The message model: a closed set of commands and replies.
//!
//! Every variant knows how to build itself from an [`Atoms`] record and how
//! to lay itself back out as one. Decode is deliberately lenient about where
//! a value sits (some clients send `NICK kirk`, others `NICK :kirk`); encode
//! always produces the canonical layout. Unknown commands decode to
//! [`Message::Unknown`] rather than failing, so protocol extensions pass
//! through harmlessly.

use crate::atoms::Atoms;

/// A parsed protocol message. Immutable value object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    User { user: String, host: String, servername: String, realname: String },
    Nick { prefix: String, nick: String },
    Join { prefix: String, channel: String },
    Part { prefix: String, channel: String, reason: Option<String> },
    Privmsg { prefix: String, target: String, content: String },
    Ping { prefix: String, id: String },
    Pong { prefix: String, id: String },
    Quit { prefix: String, message: String },
    Topic { prefix: String, channel: String, topic: String },
    TopicReply { prefix: String, channel: String, nick: String, topic: String },
    Cap { prefix: String, subcommand: String, params: Vec<String> },
    Welcome { prefix: String, nick: String },
    Users { prefix: String, channel: String, nick: String, users: Vec<String> },
    EndOfUsers { prefix: String, channel: String, nick: String },
    EndOfMotd { prefix: String, nick: String },
    NickInUse { prefix: String, nick: String, attempted: String },
    RegisterFirst { prefix: String, nick: String },
    Unknown { prefix: String, command: String, params: Vec<String>, trailing: Option<String> },
}

impl Message {
    /// Build a message from decoded atoms. Total: anything unrecognized
    /// comes back as [`Message::Unknown`].
    pub fn from_atoms(atoms: Atoms) -> Message {
        let command = atoms.command.to_ascii_uppercase();
        match command.as_str() {
            "USER" => Message::User {
                user: param(&atoms, 0),
                host: param(&atoms, 1),
                servername: param(&atoms, 2),
                realname: trailing_or_param(&atoms, 3),
            },
            "NICK" => Message::Nick {
                nick: param_or_trailing(&atoms, 0),
                prefix: atoms.prefix,
            },
            "JOIN" => Message::Join {
                channel: param_or_trailing(&atoms, 0),
                prefix: atoms.prefix,
            },
            "PART" => Message::Part {
                reason: atoms.trailing.clone(),
                channel: param(&atoms, 0),
                prefix: atoms.prefix,
            },
            "PRIVMSG" => Message::Privmsg {
                target: param(&atoms, 0),
                content: trailing_or_param(&atoms, 1),
                prefix: atoms.prefix,
            },
            "PING" => Message::Ping {
                id: param_or_trailing(&atoms, 0),
                prefix: atoms.prefix,
            },
            "PONG" => Message::Pong {
                id: param_or_trailing(&atoms, 0),
                prefix: atoms.prefix,
            },
            "QUIT" => Message::Quit {
                message: trailing_or_param(&atoms, 0),
                prefix: atoms.prefix,
            },
            "TOPIC" => Message::Topic {
                channel: param(&atoms, 0),
                topic: trailing_or_param(&atoms, 1),
                prefix: atoms.prefix,
            },
            "CAP" => Message::Cap {
                subcommand: param(&atoms, 0),
                params: cap_params(&atoms),
                prefix: atoms.prefix,
            },
            "001" => Message::Welcome {
                nick: param(&atoms, 0),
                prefix: atoms.prefix,
            },
            "332" => Message::TopicReply {
                nick: param(&atoms, 0),
                channel: param(&atoms, 1),
                topic: trailing_or_param(&atoms, 2),
                prefix: atoms.prefix,
            },
            "353" => Message::Users {
                nick: param(&atoms, 0),
                channel: param(&atoms, 2),
                users: atoms
                    .trailing
                    .as_deref()
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                prefix: atoms.prefix,
            },
            "366" => Message::EndOfUsers {
                nick: param(&atoms, 0),
                channel: param(&atoms, 1),
                prefix: atoms.prefix,
            },
            "376" => Message::EndOfMotd {
                nick: param(&atoms, 0),
                prefix: atoms.prefix,
            },
            "433" => Message::NickInUse {
                nick: param(&atoms, 0),
                attempted: param(&atoms, 1),
                prefix: atoms.prefix,
            },
            "451" => Message::RegisterFirst {
                nick: param(&atoms, 0),
                prefix: atoms.prefix,
            },
            _ => Message::Unknown {
                prefix: atoms.prefix,
                command: atoms.command,
                params: atoms.params,
                trailing: atoms.trailing,
            },
        }
    }

    /// Lay the message back out as wire atoms.
    pub fn to_atoms(&self) -> Atoms {
        match self {
            Message::User { user, host, servername, realname } => Atoms::new(
                "",
                "USER",
                vec![user.as_str(), host.as_str(), servername.as_str()],
                Some(realname),
            ),
            Message::Nick { prefix, nick } => Atoms::new(prefix, "NICK", vec![], Some(nick)),
            Message::Join { prefix, channel } => {
                Atoms::new(prefix, "JOIN", vec![channel.as_str()], None)
            }
            Message::Part { prefix, channel, reason } => {
                Atoms::new(prefix, "PART", vec![channel.as_str()], reason.as_deref())
            }
            Message::Privmsg { prefix, target, content } => {
                Atoms::new(prefix, "PRIVMSG", vec![target.as_str()], Some(content))
            }
            Message::Ping { prefix, id } => Atoms::new(prefix, "PING", vec![], Some(id)),
            Message::Pong { prefix, id } => Atoms::new(prefix, "PONG", vec![], Some(id)),
            Message::Quit { prefix, message } => Atoms::new(prefix, "QUIT", vec![], Some(message)),
            Message::Topic { prefix, channel, topic } => {
                Atoms::new(prefix, "TOPIC", vec![channel.as_str()], Some(topic))
            }
            Message::TopicReply { prefix, channel, nick, topic } => {
                Atoms::new(prefix, "332", vec![nick.as_str(), channel.as_str()], Some(topic))
            }
            Message::Cap { prefix, subcommand, params } => {
                Atoms::new(prefix, "CAP", vec![subcommand.as_str()], Some(&params.join(" ")))
            }
            Message::Welcome { prefix, nick } => Atoms::new(
                prefix,
                "001",
                vec![nick.as_str()],
                Some(&format!("Welcome to the Internet Relay Network {nick}")),
            ),
            Message::Users { prefix, channel, nick, users } => Atoms::new(
                prefix,
                "353",
                vec![nick.as_str(), "@", channel.as_str()],
                Some(&users.join(" ")),
            ),
            Message::EndOfUsers { prefix, channel, nick } => Atoms::new(
                prefix,
                "366",
                vec![nick.as_str(), channel.as_str()],
                Some("End of /NAMES list."),
            ),
            Message::EndOfMotd { prefix, nick } => {
                Atoms::new(prefix, "376", vec![nick.as_str()], Some("End of /MOTD command."))
            }
            Message::NickInUse { prefix, nick, attempted } => Atoms::new(
                prefix,
                "433",
                vec![nick_or_star(nick), attempted.as_str()],
                Some("Nickname already in use."),
            ),
            Message::RegisterFirst { prefix, nick } => Atoms::new(
                prefix,
                "451",
                vec![nick_or_star(nick)],
                Some("Register first."),
            ),
            Message::Unknown { prefix, command, params, trailing } => Atoms::new(
                prefix,
                command,
                params.iter().map(String::as_str).collect(),
                trailing.as_deref(),
            ),
        }
    }

    /// Serialize straight to a wire line.
    pub fn encode(&self) -> String {
        self.to_atoms().encode()
    }
}

fn param(atoms: &Atoms, idx: usize) -> String {
    atoms.params.get(idx).cloned().unwrap_or_default()
}

/// Value that canonically lives in `trailing` but that lax clients may send
/// as a bare positional param.
fn trailing_or_param(atoms: &Atoms, idx: usize) -> String {
    atoms
        .trailing
        .clone()
        .or_else(|| atoms.params.get(idx).cloned())
        .unwrap_or_default()
}

/// Value that canonically lives in the first param but may arrive as
/// trailing (`NICK :kirk`).
fn param_or_trailing(atoms: &Atoms, idx: usize) -> String {
    atoms
        .params
        .get(idx)
        .cloned()
        .or_else(|| atoms.trailing.clone())
        .unwrap_or_default()
}

fn cap_params(atoms: &Atoms) -> Vec<String> {
    match atoms.trailing {
        Some(ref t) => t.split_whitespace().map(str::to_string).collect(),
        None => atoms.params.iter().skip(1).cloned().collect(),
    }
}

/// An unset nick renders as `*` in numerics addressed at the client.
fn nick_or_star(nick: &str) -> &str {
    if nick.is_empty() {
        "*"
    } else {
        nick
    }
}
