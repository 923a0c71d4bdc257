//! Client events and actions.

use chrono::{DateTime, Utc};
use roomkey_proto::{Envelope, payloads::ChatBody};

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Routing inbound envelopes to events (see [`MessageRouter`](crate::MessageRouter))
/// - Forwarding application intents (send message, logout)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Application wants to send a message.
    SendMessage {
        /// Target room.
        room_id: String,
        /// Message plaintext.
        plaintext: Vec<u8>,
    },

    /// Chat envelope received.
    ChatReceived {
        /// Room of the message.
        room_id: String,
        /// Sending user, if the relay stamped one.
        sender: Option<String>,
        /// Send time.
        timestamp: Option<DateTime<Utc>>,
        /// Sealed or plain body.
        body: ChatBody,
    },

    /// Another user joined a room.
    PeerJoined {
        /// Room joined.
        room_id: String,
        /// User who joined.
        username: String,
    },

    /// Another user asked for a room's key.
    KeyRequestReceived {
        /// Room whose key is wanted.
        room_id: String,
        /// User asking, if the relay stamped one.
        requester: Option<String>,
    },

    /// A key share addressed to us arrived.
    KeyShareReceived {
        /// Room the key is for.
        room_id: String,
        /// User who sent the share, if known.
        sender: Option<String>,
        /// Base64 key material.
        encoded_key: String,
    },

    /// Session is ending; purge every key.
    Logout,
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Send an envelope to the relay.
    Send(Envelope),

    /// Deliver a readable message to the application layer.
    DeliverMessage {
        /// Room the message is from.
        room_id: String,
        /// Sending user, if known.
        sender: Option<String>,
        /// Plaintext bytes.
        plaintext: Vec<u8>,
        /// `false` for chats sent in the clear.
        was_encrypted: bool,
        /// `true` if the message waited in the pending queue.
        recovered: bool,
        /// Send time.
        timestamp: Option<DateTime<Utc>>,
    },

    /// A chat could not be decrypted. Render a placeholder.
    KeyPending {
        /// Room the message is from.
        room_id: String,
        /// Sending user, if known.
        sender: Option<String>,
        /// Send time.
        timestamp: Option<DateTime<Utc>>,
    },
}
