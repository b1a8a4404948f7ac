//! The command handler: single serialization point for all state changes.
//!
//! Connection actors push [`Event`]s onto an unbounded mailbox; one handler
//! task drains it in order. Because nothing else ever touches the
//! [`State`], nickname uniqueness and channel membership need no locks.
//!
//! [`Handler::handle_event`] is pure with respect to I/O: it mutates state
//! and returns fan-out instructions — (target set, ordered messages) pairs.
//! The `run` loop is the only place those instructions turn into sends onto
//! per-connection outbound queues.

use tokio::sync::mpsc;

use crate::message::Message;
use crate::state::{Client, ClientId, NickClaim, State};

/// Inbound event on the handler mailbox.
#[derive(Debug)]
pub enum Event {
    /// A connection actor announcing itself right after accept.
    Attach {
        id: ClientId,
        host: String,
        outbound: mpsc::Sender<Message>,
    },
    /// A decoded line from a connection.
    Message { id: ClientId, message: Message },
    /// Periodic liveness tick for a connection.
    Healthcheck { id: ClientId },
    /// The connection is gone (EOF, error, or QUIT). Sent exactly once
    /// per connection; a duplicate is a safe no-op.
    Close { id: ClientId },
}

/// One fan-out instruction: deliver `messages`, in order, to every target.
#[derive(Debug)]
pub struct Outgoing {
    pub targets: Vec<ClientId>,
    pub messages: Vec<Message>,
}

impl Outgoing {
    fn to_one(id: ClientId, message: Message) -> Self {
        Self { targets: vec![id], messages: vec![message] }
    }
}

pub struct Handler {
    server_name: String,
    state: State,
}

impl Handler {
    pub fn new(server_name: impl Into<String>, state: State) -> Self {
        Self { server_name: server_name.into(), state }
    }

    /// Drain the mailbox forever, delivering each event's fan-out.
    pub async fn run(mut self, mut mailbox: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = mailbox.recv().await {
            let outgoing = self.handle_event(event);
            self.deliver(outgoing).await;
        }
    }

    async fn deliver(&self, outgoing: Vec<Outgoing>) {
        for batch in outgoing {
            for target in &batch.targets {
                let Some(tx) = self.state.session(*target).map(|c| c.outbound.clone()) else {
                    continue;
                };
                for message in &batch.messages {
                    // A full queue suspends delivery to this one client; a
                    // closed queue means the connection is tearing down.
                    if tx.send(message.clone()).await.is_err() {
                        tracing::debug!(client = %target, "outbound queue closed, dropping");
                        break;
                    }
                }
            }
        }
    }

    /// Apply one event to the registry and compute its fan-out. Never does
    /// I/O.
    pub fn handle_event(&mut self, event: Event) -> Vec<Outgoing> {
        match event {
            Event::Attach { id, host, outbound } => {
                self.state.add_session(Client::new(id, host, outbound));
                Vec::new()
            }
            Event::Message { id, message } => self.handle_message(id, message),
            Event::Healthcheck { id } => self.handle_healthcheck(id),
            Event::Close { id } => self.handle_close(id),
        }
    }

    fn handle_message(&mut self, id: ClientId, message: Message) -> Vec<Outgoing> {
        let registered = self
            .state
            .session(id)
            .map(|c| c.registered)
            .unwrap_or(false);

        if !registered {
            match message {
                Message::Nick { .. } | Message::User { .. } | Message::Cap { .. } => {}
                // QUIT is resolved by the connection actor; a PONG to our
                // healthcheck should not be punished.
                Message::Quit { .. } | Message::Pong { .. } => return Vec::new(),
                _ => {
                    let nick = self.state.session(id).map(|c| c.nick.clone()).unwrap_or_default();
                    return vec![Outgoing::to_one(
                        id,
                        Message::RegisterFirst { prefix: self.server_name.clone(), nick },
                    )];
                }
            }
        }

        match message {
            Message::Nick { nick, .. } => self.handle_nick(id, nick),
            Message::User { user, realname, .. } => self.handle_user(id, user, realname),
            Message::Join { channel, .. } => self.handle_join(id, channel),
            Message::Part { channel, reason, .. } => self.handle_part(id, channel, reason),
            Message::Privmsg { target, content, .. } => self.handle_privmsg(id, target, content),
            Message::Ping { id: ping_id, .. } => self.handle_ping(id, ping_id),
            Message::Topic { channel, topic, .. } => self.handle_topic(id, channel, topic),
            Message::Cap { subcommand, .. } => self.handle_cap(id, subcommand),
            // QUIT becomes a Close event in the connection actor; the
            // client's parting words are kept for the Close fan-out. PONG
            // just proves liveness; everything else passes through silently.
            Message::Quit { message, .. } => {
                if let Some(client) = self.state.session_mut(id) {
                    client.quit_reason = Some(message);
                }
                Vec::new()
            }
            Message::Pong { .. } => Vec::new(),
            other => {
                tracing::debug!(client = %id, ?other, "ignoring unhandled message");
                Vec::new()
            }
        }
    }

    fn handle_nick(&mut self, id: ClientId, nick: String) -> Vec<Outgoing> {
        if nick.is_empty() {
            return Vec::new();
        }
        let Some(client) = self.state.session(id) else {
            return Vec::new();
        };
        if client.nick == nick {
            return Vec::new();
        }

        if self.state.claim_nick(&nick, id) == NickClaim::AlreadyInUse {
            let current = self.state.session(id).map(|c| c.nick.clone()).unwrap_or_default();
            return vec![Outgoing::to_one(
                id,
                Message::NickInUse {
                    prefix: self.server_name.clone(),
                    nick: current,
                    attempted: nick,
                },
            )];
        }

        let (old_nick, old_mask, registered) = {
            let client = self.state.session(id).expect("claimed nick for live session");
            (client.nick.clone(), client.fullmask(), client.registered)
        };
        if !old_nick.is_empty() {
            self.state.release_nick(&old_nick);
        }
        if let Some(client) = self.state.session_mut(id) {
            client.nick = nick.clone();
        }

        if registered {
            // Announce under the old identity mask to everyone sharing a
            // channel, plus the sender itself.
            let mut targets = self.state.channel_peers(id);
            targets.push(id);
            return vec![Outgoing {
                targets,
                messages: vec![Message::Nick { prefix: old_mask, nick }],
            }];
        }
        self.try_complete_registration(id)
    }

    fn handle_user(&mut self, id: ClientId, user: String, realname: String) -> Vec<Outgoing> {
        let Some(client) = self.state.session_mut(id) else {
            return Vec::new();
        };
        if client.registered {
            return Vec::new();
        }
        client.user = user;
        client.realname = realname;
        self.try_complete_registration(id)
    }

    /// Fires exactly once, whichever of NICK/USER completes the pair.
    fn try_complete_registration(&mut self, id: ClientId) -> Vec<Outgoing> {
        let Some(client) = self.state.session_mut(id) else {
            return Vec::new();
        };
        if client.registered || !client.has_all_info() {
            return Vec::new();
        }
        client.registered = true;
        let nick = client.nick.clone();
        tracing::info!(client = %id, %nick, "registered");

        vec![Outgoing {
            targets: vec![id],
            messages: vec![
                Message::Welcome { prefix: self.server_name.clone(), nick: nick.clone() },
                Message::EndOfMotd { prefix: self.server_name.clone(), nick },
            ],
        }]
    }

    fn handle_join(&mut self, id: ClientId, channel: String) -> Vec<Outgoing> {
        if !self.state.join_channel(&channel, id) {
            // Already a member.
            return Vec::new();
        }
        let (nick, mask) = {
            let client = self.state.session(id).expect("joining session exists");
            (client.nick.clone(), client.fullmask())
        };

        let members: Vec<ClientId> = self
            .state
            .get_channel(&channel)
            .map(|ch| ch.members.iter().copied().collect())
            .unwrap_or_default();
        let topic = self.state.get_channel(&channel).and_then(|ch| ch.topic.clone());

        let mut out = vec![Outgoing {
            targets: members,
            messages: vec![Message::Join { prefix: mask, channel: channel.clone() }],
        }];

        if let Some(topic) = topic {
            out.push(Outgoing::to_one(
                id,
                Message::TopicReply {
                    prefix: self.server_name.clone(),
                    channel: channel.clone(),
                    nick: nick.clone(),
                    topic,
                },
            ));
        }

        out.push(Outgoing {
            targets: vec![id],
            messages: vec![
                Message::Users {
                    prefix: self.server_name.clone(),
                    channel: channel.clone(),
                    nick: nick.clone(),
                    users: self.state.member_nicks(&channel),
                },
                Message::EndOfUsers { prefix: self.server_name.clone(), channel, nick },
            ],
        });
        out
    }

    fn handle_part(&mut self, id: ClientId, channel: String, reason: Option<String>) -> Vec<Outgoing> {
        if self.state.get_channel(&channel).is_none() {
            return Vec::new();
        }
        // Snapshot before removal so the leaving client sees its own
        // departure echoed.
        let targets: Vec<ClientId> = self
            .state
            .get_channel(&channel)
            .map(|ch| ch.members.iter().copied().collect())
            .unwrap_or_default();
        let mask = self
            .state
            .session(id)
            .map(|c| c.fullmask())
            .unwrap_or_default();

        self.state.part_channel(&channel, id);

        vec![Outgoing {
            targets,
            messages: vec![Message::Part { prefix: mask, channel, reason }],
        }]
    }

    fn handle_privmsg(&mut self, id: ClientId, target: String, content: String) -> Vec<Outgoing> {
        let mask = self
            .state
            .session(id)
            .map(|c| c.fullmask())
            .unwrap_or_default();
        let privmsg = Message::Privmsg { prefix: mask, target: target.clone(), content };

        if let Some(channel) = self.state.get_channel(&target) {
            let targets: Vec<ClientId> =
                channel.members.iter().copied().filter(|m| *m != id).collect();
            return vec![Outgoing { targets, messages: vec![privmsg] }];
        }
        // A nick claimed by a half-registered session is not addressable yet.
        if let Some(target_id) = self.state.lookup_nick(&target) {
            if self.state.session(target_id).is_some_and(|c| c.registered) {
                return vec![Outgoing::to_one(target_id, privmsg)];
            }
        }
        tracing::debug!(client = %id, %target, "privmsg to unknown target dropped");
        Vec::new()
    }

    fn handle_ping(&mut self, id: ClientId, ping_id: String) -> Vec<Outgoing> {
        vec![Outgoing::to_one(
            id,
            Message::Pong { prefix: self.server_name.clone(), id: ping_id },
        )]
    }

    fn handle_topic(&mut self, id: ClientId, channel: String, topic: String) -> Vec<Outgoing> {
        if self.state.get_channel(&channel).is_none() {
            return Vec::new();
        }
        let mask = self
            .state
            .session(id)
            .map(|c| c.fullmask())
            .unwrap_or_default();
        let targets: Vec<ClientId> = self
            .state
            .get_channel(&channel)
            .map(|ch| ch.members.iter().copied().collect())
            .unwrap_or_default();
        self.state.channel_entry(&channel).topic = Some(topic.clone());

        vec![Outgoing {
            targets,
            messages: vec![Message::Topic { prefix: mask, channel, topic }],
        }]
    }

    /// Capability negotiation is stubbed: LS advertises nothing, REQ is
    /// always refused.
    fn handle_cap(&mut self, id: ClientId, subcommand: String) -> Vec<Outgoing> {
        let reply = match subcommand.as_str() {
            "LS" => "LS",
            "REQ" => "NAK",
            _ => return Vec::new(),
        };
        vec![Outgoing::to_one(
            id,
            Message::Cap {
                prefix: self.server_name.clone(),
                subcommand: reply.to_string(),
                params: Vec::new(),
            },
        )]
    }

    fn handle_healthcheck(&mut self, id: ClientId) -> Vec<Outgoing> {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        vec![Outgoing::to_one(
            id,
            Message::Ping { prefix: self.server_name.clone(), id: ts.to_string() },
        )]
    }

    fn handle_close(&mut self, id: ClientId) -> Vec<Outgoing> {
        let peers = self.state.channel_peers(id);
        let Some(client) = self.state.remove_session(id) else {
            return Vec::new();
        };
        tracing::info!(client = %id, nick = %client.nick, "connection closed");
        if !client.registered || peers.is_empty() {
            return Vec::new();
        }
        let reason = client
            .quit_reason
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "Connection closed".to_string());
        vec![Outgoing {
            targets: peers,
            messages: vec![Message::Quit { prefix: client.fullmask(), message: reason }],
        }]
    }
}
