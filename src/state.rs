//! Session state registry.
//!
//! The registry owns every connected session, the claimed-nickname table,
//! and the channel membership index. It has no locking on purpose: only the
//! handler task ever touches it, so every operation is a plain synchronous
//! call. Channels and the nick table refer to clients by [`ClientId`], never
//! by value — the connection actor owns the socket, the registry owns the
//! session data.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;

use crate::message::Message;

/// Stable identity of one connection, minted at accept time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// One connected, possibly-unregistered session.
#[derive(Debug)]
pub struct Client {
    pub id: ClientId,
    /// Empty until the client sends NICK.
    pub nick: String,
    pub user: String,
    pub realname: String,
    /// Remote host, captured at connect time.
    pub host: String,
    pub registered: bool,
    /// Names of channels this client is currently in.
    pub channels: HashSet<String>,
    /// Parting words from the client's own QUIT, relayed to its peers on
    /// close.
    pub quit_reason: Option<String>,
    /// Handle onto this connection's bounded outbound queue.
    pub outbound: mpsc::Sender<Message>,
}

impl Client {
    pub fn new(id: ClientId, host: String, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            nick: String::new(),
            user: String::new(),
            realname: String::new(),
            host,
            registered: false,
            channels: HashSet::new(),
            quit_reason: None,
            outbound,
        }
    }

    /// `nick!user@host` identity mask used as prefix in relayed messages.
    pub fn fullmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.user, self.host)
    }

    /// True once both NICK and USER info are present.
    pub fn has_all_info(&self) -> bool {
        !self.nick.is_empty() && !self.user.is_empty()
    }
}

/// A named channel: member set plus an optional topic.
#[derive(Debug, Default)]
pub struct Channel {
    pub members: HashSet<ClientId>,
    pub topic: Option<String>,
}

/// Outcome of a nickname claim.
#[derive(Debug, PartialEq, Eq)]
pub enum NickClaim {
    Claimed,
    AlreadyInUse,
}

/// Authoritative in-memory store. Invariants:
/// - a nickname maps to at most one client at a time;
/// - a channel exists in the map iff its member set is non-empty;
/// - channel membership and `Client::channels` mirror each other.
#[derive(Debug, Default)]
pub struct State {
    sessions: HashMap<ClientId, Client>,
    nicks: HashMap<String, ClientId>,
    channels: HashMap<String, Channel>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly accepted connection (not yet registered).
    pub fn add_session(&mut self, client: Client) {
        self.sessions.insert(client.id, client);
    }

    /// Drop a session: releases its nick, leaves every channel, and deletes
    /// channels left empty. No-op for ids already gone, so a duplicate close
    /// is harmless.
    pub fn remove_session(&mut self, id: ClientId) -> Option<Client> {
        let client = self.sessions.remove(&id)?;
        if !client.nick.is_empty() {
            self.release_nick(&client.nick);
        }
        for name in &client.channels {
            if let Some(channel) = self.channels.get_mut(name) {
                channel.members.remove(&id);
            }
        }
        self.channels.retain(|_, ch| !ch.members.is_empty());
        Some(client)
    }

    pub fn session(&self, id: ClientId) -> Option<&Client> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.sessions.get_mut(&id)
    }

    /// Reserve a nickname. Fails without side effects if already claimed.
    pub fn claim_nick(&mut self, nick: &str, id: ClientId) -> NickClaim {
        if self.nicks.contains_key(nick) {
            return NickClaim::AlreadyInUse;
        }
        self.nicks.insert(nick.to_string(), id);
        NickClaim::Claimed
    }

    /// Idempotent removal of a nickname reservation.
    pub fn release_nick(&mut self, nick: &str) {
        self.nicks.remove(nick);
    }

    /// Resolve a nickname to the client currently holding it.
    pub fn lookup_nick(&self, nick: &str) -> Option<ClientId> {
        self.nicks.get(nick).copied()
    }

    pub fn get_channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    /// Channel for `name`, created empty if absent.
    pub fn channel_entry(&mut self, name: &str) -> &mut Channel {
        self.channels.entry(name.to_string()).or_default()
    }

    pub fn remove_channel(&mut self, name: &str) {
        self.channels.remove(name);
    }

    /// Join, keeping both membership indexes in step. Joining twice is a
    /// no-op (returns false).
    pub fn join_channel(&mut self, name: &str, id: ClientId) -> bool {
        let added = self.channel_entry(name).members.insert(id);
        if let Some(client) = self.sessions.get_mut(&id) {
            client.channels.insert(name.to_string());
        }
        added
    }

    /// Part, deleting the channel once its member set empties.
    pub fn part_channel(&mut self, name: &str, id: ClientId) {
        let now_empty = match self.channels.get_mut(name) {
            Some(channel) => {
                channel.members.remove(&id);
                channel.members.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.channels.remove(name);
        }
        if let Some(client) = self.sessions.get_mut(&id) {
            client.channels.remove(name);
        }
    }

    /// Member nicknames of a channel, for the NAMES listing.
    pub fn member_nicks(&self, name: &str) -> Vec<String> {
        match self.channels.get(name) {
            Some(channel) => channel
                .members
                .iter()
                .filter_map(|id| self.sessions.get(id))
                .map(|c| c.nick.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every other client sharing at least one channel with `id`,
    /// deduplicated. Used for QUIT and NICK-change fan-out.
    pub fn channel_peers(&self, id: ClientId) -> Vec<ClientId> {
        let Some(client) = self.sessions.get(&id) else {
            return Vec::new();
        };
        let mut peers: HashSet<ClientId> = HashSet::new();
        for name in &client.channels {
            if let Some(channel) = self.channels.get(name) {
                peers.extend(channel.members.iter().copied());
            }
        }
        peers.remove(&id);
        let mut peers: Vec<ClientId> = peers.into_iter().collect();
        peers.sort();
        peers
    }
}
