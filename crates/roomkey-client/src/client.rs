//! Key exchange state machine.
//!
//! The `Client` decides when to generate, request or share room keys. Each
//! room is in one of two states, derived from the [`KeyManager`]:
//!
//! | State  | Event                       | Action                         | Next   |
//! |--------|-----------------------------|--------------------------------|--------|
//! | NoKey  | `SendMessage`               | generate + persist, encrypt    | HasKey |
//! | HasKey | `SendMessage`               | encrypt with existing key      | HasKey |
//! | any    | `ChatReceived`, undecryptable | placeholder + `request_key`  | NoKey  |
//! | HasKey | `PeerJoined(p)`, p ≠ self   | `room_key` to p                | HasKey |
//! | NoKey  | `PeerJoined(p)`             | none                           | NoKey  |
//! | HasKey | `KeyRequestReceived(p)`     | `room_key` to p                | HasKey |
//! | NoKey  | `KeyRequestReceived(p)`     | none                           | NoKey  |
//! | any    | `KeyShareReceived(k)`       | import k (overwrite)           | HasKey |
//!
//! Only an authentication failure evicts the held key. A storage error or an
//! undecodable `encrypted` block still yields the placeholder and request but
//! leaves the key in place.
//!
//! Key exchange is fire-and-forget. Shares carry no acknowledgement and
//! requests are never retried; a later request or join moves things along.
//! Decryption failure is never an error to the caller: it is the trigger for
//! recovery.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use roomkey_core::{env::Environment, storage::KeyStore};
use roomkey_crypto::{CipherError, EncryptedPayload, NONCE_SIZE, decrypt, encrypt};
use roomkey_proto::{Envelope, payloads::ChatBody};

use crate::{
    config::DEFAULT_MAX_PENDING_PER_ROOM,
    error::ClientError,
    event::{ClientAction, ClientEvent},
    key_manager::KeyManager,
};

/// Client identity.
pub struct ClientIdentity {
    /// Username the relay stamps on our envelopes.
    pub username: String,
}

impl ClientIdentity {
    /// Create a new client identity with the given username.
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into() }
    }
}

/// Key state of one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKeyState {
    /// No cached or stored key.
    NoKey,
    /// A key is cached or stored.
    HasKey,
}

/// A chat that could not be decrypted, held until a key share arrives.
struct PendingChat {
    sender: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    payload: EncryptedPayload,
}

/// Room key exchange client.
pub struct Client<E: Environment, S: KeyStore> {
    /// Environment for nonces and timestamps.
    env: E,

    /// Client identity.
    identity: ClientIdentity,

    /// Room keys.
    keys: KeyManager<E, S>,

    /// Undecryptable chats per room, oldest first.
    pending: HashMap<String, VecDeque<PendingChat>>,

    /// Bound on each pending queue.
    max_pending_per_room: usize,
}

impl<E: Environment, S: KeyStore> Client<E, S> {
    /// Create a new client over `store`.
    pub fn new(env: E, identity: ClientIdentity, store: S) -> Self {
        Self {
            keys: KeyManager::new(env.clone(), store),
            env,
            identity,
            pending: HashMap::new(),
            max_pending_per_room: DEFAULT_MAX_PENDING_PER_ROOM,
        }
    }

    /// Override the pending queue bound. Zero disables queueing.
    #[must_use]
    pub fn with_max_pending_per_room(mut self, limit: usize) -> Self {
        self.max_pending_per_room = limit;
        self
    }

    /// Local username.
    pub fn username(&self) -> &str {
        &self.identity.username
    }

    /// Room keys.
    pub fn keys(&self) -> &KeyManager<E, S> {
        &self.keys
    }

    /// Mutable access to the room keys.
    pub fn keys_mut(&mut self) -> &mut KeyManager<E, S> {
        &mut self.keys
    }

    /// Current key state of a room.
    pub fn room_state(&self, room_id: &str) -> Result<RoomKeyState, ClientError> {
        if self.keys.has_key(room_id)? {
            Ok(RoomKeyState::HasKey)
        } else {
            Ok(RoomKeyState::NoKey)
        }
    }

    /// Number of chats waiting for a key in a room.
    pub fn pending_count(&self, room_id: &str) -> usize {
        self.pending.get(room_id).map_or(0, VecDeque::len)
    }

    /// Process an event and return resulting actions.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::SendMessage { room_id, plaintext } => {
                self.handle_send_message(&room_id, &plaintext)
            },
            ClientEvent::ChatReceived { room_id, sender, timestamp, body } => {
                self.handle_chat(&room_id, sender, timestamp, body)
            },
            ClientEvent::PeerJoined { room_id, username } => {
                self.handle_peer_joined(&room_id, &username)
            },
            ClientEvent::KeyRequestReceived { room_id, requester } => {
                self.handle_key_request(&room_id, requester.as_deref())
            },
            ClientEvent::KeyShareReceived { room_id, sender, encoded_key } => {
                self.handle_key_share(&room_id, sender.as_deref(), &encoded_key)
            },
            ClientEvent::Logout => self.handle_logout(),
        }
    }

    fn handle_send_message(
        &mut self,
        room_id: &str,
        plaintext: &[u8],
    ) -> Result<Vec<ClientAction>, ClientError> {
        let key = self.keys.ensure_key(room_id)?;

        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);

        let payload = encrypt(plaintext, key, nonce);
        let envelope = Envelope::chat(room_id, &payload, self.now());

        Ok(vec![ClientAction::Send(envelope)])
    }

    fn handle_chat(
        &mut self,
        room_id: &str,
        sender: Option<String>,
        timestamp: Option<DateTime<Utc>>,
        body: ChatBody,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let payload = match body {
            ChatBody::Plain(text) => {
                return Ok(vec![ClientAction::DeliverMessage {
                    room_id: room_id.to_string(),
                    sender,
                    plaintext: text.into_bytes(),
                    was_encrypted: false,
                    recovered: false,
                    timestamp,
                }]);
            },
            ChatBody::Encrypted(payload) => payload,
            ChatBody::Malformed(err) => {
                // Cannot be retried, so it is never queued
                tracing::warn!(room_id, sender = ?sender, error = %err, "undecodable chat, requesting key");
                return Ok(Self::key_pending(room_id, sender, timestamp));
            },
        };

        match self.try_decrypt(room_id, &payload) {
            Ok(plaintext) => Ok(vec![ClientAction::DeliverMessage {
                room_id: room_id.to_string(),
                sender,
                plaintext,
                was_encrypted: true,
                recovered: false,
                timestamp,
            }]),
            Err(err) => {
                tracing::warn!(room_id, sender = ?sender, error = %err, "decrypt failed, requesting key");

                // Only a key that fails authentication is stale
                if matches!(err, ClientError::Cipher(CipherError::AuthenticationFailed))
                    && let Err(evict_err) = self.keys.evict(room_id)
                {
                    tracing::warn!(room_id, error = %evict_err, "failed to evict stale key");
                }

                self.enqueue_pending(room_id, PendingChat {
                    sender: sender.clone(),
                    timestamp,
                    payload,
                });

                Ok(Self::key_pending(room_id, sender, timestamp))
            },
        }
    }

    /// Placeholder for the UI, then a request for the room's key.
    fn key_pending(
        room_id: &str,
        sender: Option<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Vec<ClientAction> {
        vec![
            ClientAction::KeyPending { room_id: room_id.to_string(), sender, timestamp },
            ClientAction::Send(Envelope::request_key(room_id)),
        ]
    }

    fn try_decrypt(
        &mut self,
        room_id: &str,
        payload: &EncryptedPayload,
    ) -> Result<Vec<u8>, ClientError> {
        let key = self
            .keys
            .key(room_id)?
            .ok_or_else(|| ClientError::KeyUnavailable { room_id: room_id.to_string() })?;

        Ok(decrypt(payload, key)?)
    }

    fn handle_peer_joined(
        &mut self,
        room_id: &str,
        peer: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if peer == self.identity.username {
            return Ok(vec![]);
        }
        self.share_key(room_id, peer)
    }

    fn handle_key_request(
        &mut self,
        room_id: &str,
        requester: Option<&str>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let Some(requester) = requester else {
            tracing::debug!(room_id, "ignoring key request without requester");
            return Ok(vec![]);
        };

        if requester == self.identity.username {
            return Ok(vec![]);
        }
        self.share_key(room_id, requester)
    }

    /// `room_key` to `peer` if we hold a key; nothing otherwise.
    fn share_key(&mut self, room_id: &str, peer: &str) -> Result<Vec<ClientAction>, ClientError> {
        let Some(encoded) = self.keys.export_key_encoded(room_id)? else {
            tracing::debug!(room_id, peer, "no key to share");
            return Ok(vec![]);
        };

        tracing::info!(room_id, peer, "sharing room key");
        Ok(vec![ClientAction::Send(Envelope::room_key(room_id, peer, &encoded))])
    }

    fn handle_key_share(
        &mut self,
        room_id: &str,
        sender: Option<&str>,
        encoded_key: &str,
    ) -> Result<Vec<ClientAction>, ClientError> {
        self.keys.import_key(room_id, encoded_key)?;

        tracing::debug!(room_id, sender = ?sender, "installed shared key");
        self.retry_pending(room_id)
    }

    /// Decrypt whatever the pending queue can now open.
    ///
    /// Chats sealed under some other key stay queued.
    fn retry_pending(&mut self, room_id: &str) -> Result<Vec<ClientAction>, ClientError> {
        let Some(queue) = self.pending.remove(room_id) else {
            return Ok(vec![]);
        };

        let Some(key) = self.keys.key(room_id)? else {
            self.pending.insert(room_id.to_string(), queue);
            return Ok(vec![]);
        };

        let mut actions = Vec::new();
        let mut still_pending = VecDeque::new();

        for chat in queue {
            match decrypt(&chat.payload, key) {
                Ok(plaintext) => actions.push(ClientAction::DeliverMessage {
                    room_id: room_id.to_string(),
                    sender: chat.sender,
                    plaintext,
                    was_encrypted: true,
                    recovered: true,
                    timestamp: chat.timestamp,
                }),
                Err(_) => still_pending.push_back(chat),
            }
        }

        tracing::debug!(
            room_id,
            recovered = actions.len(),
            pending = still_pending.len(),
            "retried pending messages"
        );

        if !still_pending.is_empty() {
            self.pending.insert(room_id.to_string(), still_pending);
        }

        Ok(actions)
    }

    fn enqueue_pending(&mut self, room_id: &str, chat: PendingChat) {
        if self.max_pending_per_room == 0 {
            return;
        }

        let queue = self.pending.entry(room_id.to_string()).or_default();
        if queue.len() >= self.max_pending_per_room {
            queue.pop_front();
            tracing::debug!(room_id, "pending queue full, dropped oldest message");
        }
        queue.push_back(chat);
    }

    fn handle_logout(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        self.pending.clear();
        self.keys.clear()?;

        tracing::info!(username = %self.identity.username, "purged all room keys");
        Ok(vec![])
    }

    fn now(&self) -> DateTime<Utc> {
        let secs = self.env.wall_clock_secs();
        i64::try_from(secs).ok().and_then(|secs| DateTime::from_timestamp(secs, 0)).unwrap_or_else(
            || {
                tracing::warn!(secs, "wall clock out of range, stamping the epoch");
                DateTime::default()
            },
        )
    }
}
