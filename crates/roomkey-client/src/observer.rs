//! Events surfaced to the UI layer.

use chrono::{DateTime, Utc};
use roomkey_proto::payloads::MembershipChange;

use crate::transport::ConnectionStatus;

/// Typed notification from a session. The session never renders anything
/// itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A chat message is ready for display.
    MessageDecrypted {
        /// Room of the message.
        room_id: String,
        /// Sending user, if the relay stamped one.
        sender: Option<String>,
        /// Message text (lossy UTF-8).
        text: String,
        /// `false` for chats sent in the clear.
        was_encrypted: bool,
        /// `true` if this message was held until a key share arrived.
        recovered: bool,
        /// Send time.
        timestamp: Option<DateTime<Utc>>,
    },

    /// A chat could not be decrypted; show a placeholder. A key request has
    /// been sent.
    KeyPending {
        /// Room of the message.
        room_id: String,
        /// Sending user, if the relay stamped one.
        sender: Option<String>,
        /// Send time.
        timestamp: Option<DateTime<Utc>>,
    },

    /// Relay link state changed.
    StatusChanged(ConnectionStatus),

    /// Known users changed.
    PeersChanged(Vec<String>),

    /// Relay notice.
    Notice {
        /// Room the notice concerns.
        room_id: String,
        /// User the notice is about.
        username: Option<String>,
        /// Human-readable text.
        content: Option<String>,
        /// Membership change, if any.
        change: Option<MembershipChange>,
    },

    /// A non-fatal failure (malformed envelope, rejected key share, storage
    /// error).
    Warning {
        /// Room involved, if known.
        room_id: Option<String>,
        /// Description.
        reason: String,
    },
}

/// Receives [`SessionEvent`]s.
pub trait SessionObserver {
    /// Handle one event.
    fn on_event(&mut self, event: SessionEvent);
}
