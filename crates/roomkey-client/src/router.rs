//! Inbound envelope dispatch.
//!
//! The router reads each envelope's declared type and turns it into either a
//! [`ClientEvent`] for the key exchange state machine or a [`SessionEvent`]
//! for the observer. It also tracks the roster so that a peer is announced
//! to the state machine once per join.
//!
//! The relay sends `user_list` only to a newly connected client, and
//! `system` `user_joined` to everyone else. The first roster after connecting
//! is therefore taken as-is: those peers were already in the room and must
//! not receive our (possibly stale) stored key.

use std::collections::BTreeSet;

use roomkey_proto::{
    Envelope, Payload, ProtocolError,
    payloads::{KeyShare, MembershipChange, SystemNotice},
};

use crate::{event::ClientEvent, observer::SessionEvent};

/// Where a routed envelope goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Feed into the key exchange state machine.
    Protocol(ClientEvent),
    /// Surface directly to the observer.
    Notify(SessionEvent),
}

/// Type-based dispatcher for inbound envelopes.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    username: String,
    default_room: String,
    roster: BTreeSet<String>,
    roster_seeded: bool,
}

impl MessageRouter {
    /// Router for `username`; envelopes without a room go to `default_room`.
    pub fn new(username: impl Into<String>, default_room: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            default_room: default_room.into(),
            roster: BTreeSet::new(),
            roster_seeded: false,
        }
    }

    /// Local username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Room assumed for envelopes without a `roomId`.
    pub fn default_room(&self) -> &str {
        &self.default_room
    }

    /// Known users, sorted.
    pub fn roster(&self) -> Vec<String> {
        self.roster.iter().cloned().collect()
    }

    /// Forget the roster. The next `user_list` seeds it again silently.
    pub fn reset(&mut self) {
        self.roster.clear();
        self.roster_seeded = false;
    }

    /// Dispatch one envelope.
    ///
    /// # Errors
    ///
    /// - `MissingField`/`InvalidEncoding`: the envelope does not carry what
    ///   its type requires
    pub fn route(&mut self, envelope: &Envelope) -> Result<Vec<Route>, ProtocolError> {
        let routes = match envelope.payload()? {
            Payload::Chat(message) => vec![Route::Protocol(ClientEvent::ChatReceived {
                room_id: self.room(message.room_id),
                sender: message.sender,
                timestamp: message.timestamp,
                body: message.body,
            })],
            Payload::KeyShare(share) => self.route_key_share(share),
            Payload::KeyRequest(request) => {
                vec![Route::Protocol(ClientEvent::KeyRequestReceived {
                    room_id: self.room(request.room_id),
                    requester: request.requester,
                })]
            },
            Payload::System(notice) => self.route_notice(notice),
            Payload::UserList(users) => self.route_user_list(users),
            Payload::Unknown => {
                tracing::debug!(kind = ?envelope.kind, "ignoring envelope of unknown type");
                vec![]
            },
        };

        Ok(routes)
    }

    fn route_key_share(&self, share: KeyShare) -> Vec<Route> {
        if share.recipient.as_ref().is_some_and(|recipient| *recipient != self.username) {
            tracing::warn!(recipient = ?share.recipient, "dropping key share addressed to another user");
            return vec![];
        }

        vec![Route::Protocol(ClientEvent::KeyShareReceived {
            room_id: self.room(share.room_id),
            sender: share.sender,
            encoded_key: share.encoded_key,
        })]
    }

    fn route_notice(&mut self, notice: SystemNotice) -> Vec<Route> {
        let room_id = self.room(notice.room_id);
        let mut routes = Vec::new();

        let peer = notice.username.as_ref().filter(|username| **username != self.username);
        if let Some(username) = peer {
            match notice.change {
                Some(MembershipChange::Joined) => {
                    self.roster.insert(username.clone());
                    routes.push(Route::Protocol(ClientEvent::PeerJoined {
                        room_id: room_id.clone(),
                        username: username.clone(),
                    }));
                    routes.push(Route::Notify(SessionEvent::PeersChanged(self.roster())));
                },
                Some(MembershipChange::Left) => {
                    if self.roster.remove(username) {
                        routes.push(Route::Notify(SessionEvent::PeersChanged(self.roster())));
                    }
                },
                None => {},
            }
        }

        routes.push(Route::Notify(SessionEvent::Notice {
            room_id,
            username: notice.username,
            content: notice.content,
            change: notice.change,
        }));
        routes
    }

    fn route_user_list(&mut self, users: Vec<String>) -> Vec<Route> {
        let roster: BTreeSet<String> = users.into_iter().collect();
        let mut routes = Vec::new();

        if self.roster_seeded {
            for username in roster.difference(&self.roster) {
                if *username != self.username {
                    routes.push(Route::Protocol(ClientEvent::PeerJoined {
                        room_id: self.default_room.clone(),
                        username: username.clone(),
                    }));
                }
            }
        } else {
            tracing::debug!(peers = roster.len(), "seeded roster");
            self.roster_seeded = true;
        }

        self.roster = roster;
        routes.push(Route::Notify(SessionEvent::PeersChanged(self.roster())));
        routes
    }

    fn room(&self, room_id: Option<String>) -> String {
        room_id.filter(|room| !room.is_empty()).unwrap_or_else(|| self.default_room.clone())
    }
}
