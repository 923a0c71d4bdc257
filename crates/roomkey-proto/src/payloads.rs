//! Typed views of envelopes.
//!
//! Each [`Payload`] variant maps to exactly one [`EnvelopeType`]. Fields the
//! relay may omit (room, sender) stay optional here; the client fills them
//! from its own configuration.

use chrono::{DateTime, Utc};
use roomkey_crypto::EncryptedPayload;

use crate::{Envelope, EnvelopeType, ProtocolError};

/// Body of a chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatBody {
    /// Sealed under the room key.
    Encrypted(EncryptedPayload),
    /// Sent in the clear.
    Plain(String),
    /// An `encrypted` block that cannot be decoded. Nothing can open it, but
    /// it is still a message the user should see a placeholder for.
    Malformed(ProtocolError),
}

/// Room message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Room, if the relay stamped one.
    pub room_id: Option<String>,
    /// Sending user, if the relay stamped one.
    pub sender: Option<String>,
    /// Send time.
    pub timestamp: Option<DateTime<Utc>>,
    /// Message body.
    pub body: ChatBody,
}

/// Key share (`room_key`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShare {
    /// Room the key belongs to.
    pub room_id: Option<String>,
    /// User the share was addressed to.
    pub recipient: Option<String>,
    /// User who sent the share.
    pub sender: Option<String>,
    /// Base64 key material.
    pub encoded_key: String,
}

/// Key request (`request_key`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRequest {
    /// Room whose key is wanted.
    pub room_id: Option<String>,
    /// User asking for the key.
    pub requester: Option<String>,
}

/// Membership change announced by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    /// `data.event == "user_joined"`
    Joined,
    /// `data.event == "user_left"`
    Left,
}

impl MembershipChange {
    /// Value of `data.event` on the wire.
    pub fn event_name(self) -> &'static str {
        match self {
            Self::Joined => "user_joined",
            Self::Left => "user_left",
        }
    }

    fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "user_joined" => Some(Self::Joined),
            "user_left" => Some(Self::Left),
            _ => None,
        }
    }
}

/// Relay notice (`system`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemNotice {
    /// Room the notice concerns.
    pub room_id: Option<String>,
    /// User the notice is about.
    pub username: Option<String>,
    /// Human-readable text.
    pub content: Option<String>,
    /// Parsed membership change, if any.
    pub change: Option<MembershipChange>,
}

/// All envelope payloads this client understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `chat`
    Chat(ChatMessage),
    /// `room_key`
    KeyShare(KeyShare),
    /// `request_key`
    KeyRequest(KeyRequest),
    /// `system`
    System(SystemNotice),
    /// `user_list`: usernames currently connected.
    UserList(Vec<String>),
    /// Any other type.
    Unknown,
}

impl Payload {
    /// Extract the payload selected by `envelope.kind`.
    ///
    /// # Errors
    ///
    /// - `MissingField`: a `chat` has neither `encrypted` nor `content`, or a
    ///   `room_key` has no `data.key`
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        match envelope.kind {
            EnvelopeType::Chat => {
                let body = match (&envelope.encrypted, &envelope.content) {
                    (Some(encrypted), _) => match encrypted.to_payload() {
                        Ok(payload) => ChatBody::Encrypted(payload),
                        Err(err) => ChatBody::Malformed(err),
                    },
                    (None, Some(content)) => ChatBody::Plain(content.clone()),
                    (None, None) => {
                        return Err(ProtocolError::MissingField {
                            kind: EnvelopeType::Chat,
                            field: "encrypted",
                        });
                    },
                };

                Ok(Self::Chat(ChatMessage {
                    room_id: envelope.room_id.clone(),
                    sender: envelope.username.clone(),
                    timestamp: envelope.timestamp,
                    body,
                }))
            },
            EnvelopeType::RoomKey => {
                let encoded_key = envelope.data_str("key").ok_or(ProtocolError::MissingField {
                    kind: EnvelopeType::RoomKey,
                    field: "data.key",
                })?;

                Ok(Self::KeyShare(KeyShare {
                    room_id: envelope.room_id.clone(),
                    recipient: envelope.recipient.clone(),
                    sender: envelope.username.clone(),
                    encoded_key: encoded_key.to_string(),
                }))
            },
            EnvelopeType::RequestKey => Ok(Self::KeyRequest(KeyRequest {
                room_id: envelope.room_id.clone(),
                requester: envelope.username.clone(),
            })),
            EnvelopeType::System => {
                let change = envelope.data_str("event").and_then(MembershipChange::from_event_name);

                Ok(Self::System(SystemNotice {
                    room_id: envelope.room_id.clone(),
                    username: envelope.username.clone(),
                    content: envelope.content.clone(),
                    change,
                }))
            },
            EnvelopeType::UserList => {
                let users = envelope
                    .data
                    .as_ref()
                    .and_then(|data| data.get("users"))
                    .and_then(|users| users.as_array())
                    .map(|users| {
                        users
                            .iter()
                            .filter_map(|user| user.get("username")?.as_str())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();

                Ok(Self::UserList(users))
            },
            EnvelopeType::Unknown => Ok(Self::Unknown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_chat_payload() {
        let sealed = EncryptedPayload { nonce: [3; 12], ciphertext: vec![9; 17] };
        let mut envelope =
            Envelope::chat("general", &sealed, DateTime::from_timestamp(10, 0).unwrap());
        envelope.username = Some("alice".to_string());

        let Payload::Chat(chat) = envelope.payload().unwrap() else {
            panic!("expected chat payload");
        };

        assert_eq!(chat.room_id.as_deref(), Some("general"));
        assert_eq!(chat.sender.as_deref(), Some("alice"));
        assert_eq!(chat.body, ChatBody::Encrypted(sealed));
    }

    #[test]
    fn plain_chat_payload() {
        let envelope =
            Envelope::decode(r#"{"type":"chat","content":"hi there","username":"bob"}"#).unwrap();

        let Payload::Chat(chat) = envelope.payload().unwrap() else {
            panic!("expected chat payload");
        };

        assert_eq!(chat.body, ChatBody::Plain("hi there".to_string()));
        assert_eq!(chat.room_id, None);
    }

    #[test]
    fn empty_chat_is_rejected() {
        let envelope = Envelope::new(EnvelopeType::Chat);

        assert_eq!(
            envelope.payload(),
            Err(ProtocolError::MissingField { kind: EnvelopeType::Chat, field: "encrypted" })
        );
    }

    #[test]
    fn malformed_ciphertext_is_still_a_chat() {
        let envelope = Envelope::decode(
            r#"{"type":"chat","username":"bob","roomId":"general","encrypted":{"ciphertext":"AAAA","iv":"AwMDAwMDAwM="}}"#,
        )
        .unwrap();

        let Payload::Chat(chat) = envelope.payload().unwrap() else {
            panic!("expected chat payload");
        };

        assert!(matches!(
            chat.body,
            ChatBody::Malformed(ProtocolError::InvalidEncoding { field: "iv", .. })
        ));
        assert_eq!(chat.sender.as_deref(), Some("bob"));
    }

    #[test]
    fn key_share_payload() {
        let mut envelope = Envelope::room_key("general", "bob", "S0VZ");
        envelope.username = Some("alice".to_string());

        assert_eq!(
            envelope.payload().unwrap(),
            Payload::KeyShare(KeyShare {
                room_id: Some("general".to_string()),
                recipient: Some("bob".to_string()),
                sender: Some("alice".to_string()),
                encoded_key: "S0VZ".to_string(),
            })
        );
    }

    #[test]
    fn key_share_without_key_is_rejected() {
        let envelope =
            Envelope::decode(r#"{"type":"room_key","recipient":"bob","data":{"key":42}}"#).unwrap();

        assert_eq!(
            envelope.payload(),
            Err(ProtocolError::MissingField { kind: EnvelopeType::RoomKey, field: "data.key" })
        );
    }

    #[test]
    fn system_join_and_leave() {
        let joined = Envelope::decode(
            r#"{"type":"system","username":"carol","roomId":"general","content":"carol joined the chat","data":{"event":"user_joined"}}"#,
        )
        .unwrap();
        let left = Envelope::decode(
            r#"{"type":"system","username":"carol","content":"carol left the chat","data":{"event":"user_left"}}"#,
        )
        .unwrap();

        let Payload::System(joined) = joined.payload().unwrap() else {
            panic!("expected system payload");
        };
        let Payload::System(left) = left.payload().unwrap() else {
            panic!("expected system payload");
        };

        assert_eq!(joined.change, Some(MembershipChange::Joined));
        assert_eq!(joined.username.as_deref(), Some("carol"));
        assert_eq!(left.change, Some(MembershipChange::Left));
        assert_eq!(left.room_id, None);
    }

    #[test]
    fn user_list_payload() {
        let envelope = Envelope::decode(
            r#"{"type":"user_list","data":{"users":[{"username":"alice"},{"username":"bob"},{"nope":1}]}}"#,
        )
        .unwrap();

        assert_eq!(
            envelope.payload().unwrap(),
            Payload::UserList(vec!["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn user_list_without_data_is_empty() {
        let envelope = Envelope::new(EnvelopeType::UserList);
        assert_eq!(envelope.payload().unwrap(), Payload::UserList(vec![]));
    }
}
