//! In-process relay with the production routing rules.
//!
//! The relay trusts nothing it forwards and reads nothing but routing fields:
//!
//! - every inbound envelope is stamped with the sender's username, the
//!   current time and room `general`
//! - `chat` (and any unrecognised type) goes to every connected client,
//!   sender included
//! - `room_key` goes only to its `recipient`
//! - `request_key` is rewritten to `{type, roomId, username}` and goes to
//!   every client except the requester
//! - on connect the newcomer gets `user_list`, everyone else `user_joined`
//! - on disconnect everyone remaining gets `user_left`
//!
//! Envelopes are queued as JSON so the wire codec is exercised end to end.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::DateTime;
use roomkey_client::{Environment, Transport};
use roomkey_proto::{Envelope, EnvelopeType, payloads::MembershipChange};

use crate::SimEnv;

/// Room the relay forces on every envelope.
pub const RELAY_ROOM: &str = "general";

/// Counters for what the relay has forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Chats broadcast.
    pub chats: usize,
    /// Key shares forwarded to a connected recipient.
    pub key_shares: usize,
    /// Key requests fanned out.
    pub key_requests: usize,
    /// Envelopes dropped (sender or recipient not connected).
    pub dropped: usize,
}

#[derive(Default)]
struct RelayState {
    /// Inbox per connected user, oldest first.
    inboxes: BTreeMap<String, VecDeque<String>>,
    stats: RelayStats,
}

impl RelayState {
    fn push(&mut self, username: &str, envelope: &Envelope) {
        let Some(inbox) = self.inboxes.get_mut(username) else {
            self.stats.dropped += 1;
            return;
        };

        match envelope.encode() {
            Ok(json) => inbox.push_back(json),
            Err(err) => tracing::warn!(error = %err, "relay failed to encode envelope"),
        }
    }

    fn broadcast(&mut self, envelope: &Envelope, except: Option<&str>) {
        let recipients: Vec<String> = self
            .inboxes
            .keys()
            .filter(|username| Some(username.as_str()) != except)
            .cloned()
            .collect();

        for username in recipients {
            self.push(&username, envelope);
        }
    }
}

/// Shared in-process relay. Clones refer to the same relay.
#[derive(Clone)]
pub struct SimRelay {
    env: SimEnv,
    state: Arc<Mutex<RelayState>>,
}

impl SimRelay {
    /// Empty relay stamping time from `env`.
    pub fn new(env: SimEnv) -> Self {
        Self { env, state: Arc::new(Mutex::new(RelayState::default())) }
    }

    /// Transport handle for `username`. Sends fail until the user connects.
    pub fn transport(&self, username: impl Into<String>) -> RelayTransport {
        RelayTransport { relay: self.clone(), username: username.into() }
    }

    /// Register a connection.
    ///
    /// The newcomer receives the roster; everyone else a join notice.
    pub fn connect(&self, username: &str) {
        let mut state = self.lock();
        state.inboxes.insert(username.to_string(), VecDeque::new());

        let roster = Envelope::user_list(state.inboxes.keys());
        state.push(username, &roster);

        let joined = Envelope {
            room_id: Some(RELAY_ROOM.to_string()),
            ..Envelope::membership(username, MembershipChange::Joined)
        };
        state.broadcast(&joined, Some(username));

        tracing::debug!(username, connected = state.inboxes.len(), "relay: client connected");
    }

    /// Drop a connection and its undelivered inbox.
    pub fn disconnect(&self, username: &str) {
        let mut state = self.lock();
        if state.inboxes.remove(username).is_none() {
            return;
        }

        state.broadcast(&Envelope::membership(username, MembershipChange::Left), None);
        tracing::debug!(username, connected = state.inboxes.len(), "relay: client disconnected");
    }

    /// Whether `username` is connected.
    pub fn is_connected(&self, username: &str) -> bool {
        self.lock().inboxes.contains_key(username)
    }

    /// Connected users, sorted.
    pub fn connected_users(&self) -> Vec<String> {
        self.lock().inboxes.keys().cloned().collect()
    }

    /// Take everything queued for `username`.
    pub fn take_inbox(&self, username: &str) -> Vec<String> {
        self.lock().inboxes.get_mut(username).map(|inbox| inbox.drain(..).collect()).unwrap_or_default()
    }

    /// Whether any inbox holds undelivered envelopes.
    pub fn has_pending(&self) -> bool {
        self.lock().inboxes.values().any(|inbox| !inbox.is_empty())
    }

    /// Forwarding counters.
    pub fn stats(&self) -> RelayStats {
        self.lock().stats
    }

    /// Accept an envelope from `sender` and route it.
    ///
    /// Returns `false` if the sender is not connected.
    pub fn submit(&self, sender: &str, envelope: &Envelope) -> bool {
        let secs = self.env.wall_clock_secs();
        let now = i64::try_from(secs).ok().and_then(|secs| DateTime::from_timestamp(secs, 0));
        if now.is_none() {
            tracing::warn!(secs, "wall clock out of range, leaving timestamp unset");
        }
        let mut state = self.lock();

        if !state.inboxes.contains_key(sender) {
            state.stats.dropped += 1;
            return false;
        }

        let mut stamped = envelope.clone();
        stamped.username = Some(sender.to_string());
        stamped.timestamp = now;
        stamped.room_id = Some(RELAY_ROOM.to_string());

        match stamped.kind {
            EnvelopeType::RoomKey => {
                let recipient = stamped.recipient.clone().unwrap_or_default();
                if state.inboxes.contains_key(&recipient) {
                    state.stats.key_shares += 1;
                }
                state.push(&recipient, &stamped);
            },
            EnvelopeType::RequestKey => {
                state.stats.key_requests += 1;
                let request = Envelope {
                    room_id: Some(RELAY_ROOM.to_string()),
                    username: Some(sender.to_string()),
                    ..Envelope::new(EnvelopeType::RequestKey)
                };
                state.broadcast(&request, Some(sender));
            },
            EnvelopeType::Chat => {
                state.stats.chats += 1;
                state.broadcast(&stamped, None);
            },
            EnvelopeType::System | EnvelopeType::UserList | EnvelopeType::Unknown => {
                state.broadcast(&stamped, None);
            },
        }

        true
    }

    fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One client's link to a [`SimRelay`].
pub struct RelayTransport {
    relay: SimRelay,
    username: String,
}

impl RelayTransport {
    /// User this transport sends as.
    pub fn username(&self) -> &str {
        &self.username
    }
}

impl Transport for RelayTransport {
    fn send(&mut self, envelope: &Envelope) -> bool {
        self.relay.submit(&self.username, envelope)
    }
}

#[cfg(test)]
mod tests {
    use roomkey_proto::Payload;

    use super::*;

    fn decode_all(inbox: Vec<String>) -> Vec<Envelope> {
        inbox.iter().map(|json| Envelope::decode(json).unwrap()).collect()
    }

    #[test]
    fn connect_sends_roster_to_newcomer_and_notice_to_others() {
        let relay = SimRelay::new(SimEnv::new());
        relay.connect("alice");
        relay.take_inbox("alice");

        relay.connect("bob");

        let bob = decode_all(relay.take_inbox("bob"));
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].payload().unwrap(), Payload::UserList(vec![
            "alice".to_string(),
            "bob".to_string()
        ]));

        let alice = decode_all(relay.take_inbox("alice"));
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].kind, EnvelopeType::System);
        assert_eq!(alice[0].username.as_deref(), Some("bob"));
    }

    #[test]
    fn chat_is_echoed_to_sender() {
        let relay = SimRelay::new(SimEnv::new());
        relay.connect("alice");
        relay.connect("bob");
        relay.take_inbox("alice");
        relay.take_inbox("bob");

        let mut chat = Envelope::new(EnvelopeType::Chat);
        chat.content = Some("hi".to_string());
        chat.room_id = Some("elsewhere".to_string());
        assert!(relay.transport("alice").send(&chat));

        for user in ["alice", "bob"] {
            let inbox = decode_all(relay.take_inbox(user));
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].username.as_deref(), Some("alice"));
            assert_eq!(inbox[0].room_id.as_deref(), Some(RELAY_ROOM));
            assert!(inbox[0].timestamp.is_some());
        }
    }

    #[test]
    fn out_of_range_clock_leaves_timestamp_unset() {
        let env = SimEnv::new();
        let relay = SimRelay::new(env.clone());
        relay.connect("alice");
        relay.take_inbox("alice");
        env.advance(u64::MAX - env.wall_clock_secs());

        let mut chat = Envelope::new(EnvelopeType::Chat);
        chat.content = Some("late".to_string());
        assert!(relay.transport("alice").send(&chat));

        let inbox = decode_all(relay.take_inbox("alice"));
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].timestamp, None);
    }

    #[test]
    fn key_share_reaches_only_recipient() {
        let relay = SimRelay::new(SimEnv::new());
        for user in ["alice", "bob", "carol"] {
            relay.connect(user);
        }
        for user in ["alice", "bob", "carol"] {
            relay.take_inbox(user);
        }

        relay.transport("alice").send(&Envelope::room_key("general", "bob", "a2V5"));

        assert!(relay.take_inbox("alice").is_empty());
        assert!(relay.take_inbox("carol").is_empty());
        assert_eq!(relay.take_inbox("bob").len(), 1);
        assert_eq!(relay.stats().key_shares, 1);
    }

    #[test]
    fn key_request_skips_requester() {
        let relay = SimRelay::new(SimEnv::new());
        for user in ["alice", "bob", "carol"] {
            relay.connect(user);
        }
        for user in ["alice", "bob", "carol"] {
            relay.take_inbox(user);
        }

        relay.transport("carol").send(&Envelope::request_key("general"));

        assert!(relay.take_inbox("carol").is_empty());
        for user in ["alice", "bob"] {
            let inbox = decode_all(relay.take_inbox(user));
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].kind, EnvelopeType::RequestKey);
            assert_eq!(inbox[0].username.as_deref(), Some("carol"));
        }
    }

    #[test]
    fn disconnected_sender_is_rejected() {
        let relay = SimRelay::new(SimEnv::new());
        let mut transport = relay.transport("alice");

        assert!(!transport.send(&Envelope::request_key("general")));
        assert_eq!(relay.stats().dropped, 1);
    }

    #[test]
    fn disconnect_notifies_remaining_clients() {
        let relay = SimRelay::new(SimEnv::new());
        relay.connect("alice");
        relay.connect("bob");
        relay.take_inbox("alice");

        relay.disconnect("bob");

        assert!(!relay.is_connected("bob"));
        let alice = decode_all(relay.take_inbox("alice"));
        assert_eq!(alice.len(), 1);
        assert!(matches!(
            alice[0].payload().unwrap(),
            Payload::System(notice) if notice.change == Some(MembershipChange::Left)
        ));
    }
}
