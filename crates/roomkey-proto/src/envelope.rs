//! Transport envelope.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use roomkey_crypto::EncryptedPayload;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    ProtocolError,
    payloads::{MembershipChange, Payload},
};

/// Declared type of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    /// Room message, encrypted or plain.
    Chat,
    /// Relay notice (join / leave).
    System,
    /// Relay roster.
    UserList,
    /// Key share targeted at one recipient.
    RoomKey,
    /// Request for the current room key.
    RequestKey,
    /// Any type this client does not understand.
    #[serde(other)]
    Unknown,
}

/// Ciphertext block of a chat envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedData {
    /// Base64 ciphertext including the GCM tag.
    pub ciphertext: String,
    /// Base64 96-bit nonce.
    pub iv: String,
    /// Room whose key sealed the ciphertext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

impl EncryptedData {
    /// Encode a sealed payload for the wire.
    pub fn from_payload(payload: &EncryptedPayload, key_id: &str) -> Self {
        Self {
            ciphertext: STANDARD.encode(&payload.ciphertext),
            iv: STANDARD.encode(payload.nonce),
            key_id: Some(key_id.to_string()),
        }
    }

    /// Decode the wire block back into a sealed payload.
    ///
    /// # Errors
    ///
    /// - `InvalidEncoding`: either field is not base64, or the nonce is not
    ///   96 bits
    pub fn to_payload(&self) -> Result<EncryptedPayload, ProtocolError> {
        let ciphertext = STANDARD.decode(&self.ciphertext).map_err(|e| {
            ProtocolError::InvalidEncoding { field: "ciphertext", reason: e.to_string() }
        })?;
        let iv = STANDARD
            .decode(&self.iv)
            .map_err(|e| ProtocolError::InvalidEncoding { field: "iv", reason: e.to_string() })?;

        EncryptedPayload::from_parts(&iv, ciphertext)
            .map_err(|e| ProtocolError::InvalidEncoding { field: "iv", reason: e.to_string() })
    }
}

/// A JSON object carried by the relay.
///
/// Field presence depends on [`EnvelopeType`]; absent fields are omitted on
/// the wire. The relay stamps `username`, `roomId` and `timestamp` on
/// everything it forwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: EnvelopeType,

    /// Plain text (unencrypted chat, system notices).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Originating user, stamped by the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Target user of a `room_key` share.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// Room the envelope belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,

    /// ISO-8601 send time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Ciphertext block of an encrypted chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<EncryptedData>,

    /// Type-specific structured data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Empty envelope of the given type.
    pub fn new(kind: EnvelopeType) -> Self {
        Self {
            kind,
            content: None,
            username: None,
            recipient: None,
            room_id: None,
            timestamp: None,
            encrypted: None,
            data: None,
        }
    }

    /// Encrypted chat for a room.
    pub fn chat(room_id: &str, payload: &EncryptedPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            room_id: Some(room_id.to_string()),
            timestamp: Some(timestamp),
            encrypted: Some(EncryptedData::from_payload(payload, room_id)),
            ..Self::new(EnvelopeType::Chat)
        }
    }

    /// Key share addressed to a single recipient.
    pub fn room_key(room_id: &str, recipient: &str, encoded_key: &str) -> Self {
        Self {
            room_id: Some(room_id.to_string()),
            recipient: Some(recipient.to_string()),
            data: Some(json!({ "key": encoded_key })),
            ..Self::new(EnvelopeType::RoomKey)
        }
    }

    /// Request for the current key of a room.
    pub fn request_key(room_id: &str) -> Self {
        Self { room_id: Some(room_id.to_string()), ..Self::new(EnvelopeType::RequestKey) }
    }

    /// Roster the relay sends to a newly connected client.
    pub fn user_list<I, U>(users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: AsRef<str>,
    {
        let users: Vec<Value> =
            users.into_iter().map(|user| json!({ "username": user.as_ref() })).collect();
        Self { data: Some(json!({ "users": users })), ..Self::new(EnvelopeType::UserList) }
    }

    /// Relay notice that `username` joined or left.
    pub fn membership(username: &str, change: MembershipChange) -> Self {
        let content = match change {
            MembershipChange::Joined => format!("{username} joined the chat"),
            MembershipChange::Left => format!("{username} left the chat"),
        };

        Self {
            username: Some(username.to_string()),
            content: Some(content),
            data: Some(json!({ "event": change.event_name() })),
            ..Self::new(EnvelopeType::System)
        }
    }

    /// Serialize to a JSON string.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a JSON string.
    ///
    /// # Errors
    ///
    /// - `Json`: input is not a JSON object with a string `type`
    pub fn decode(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read the typed payload for this envelope's declared type.
    pub fn payload(&self) -> Result<Payload, ProtocolError> {
        Payload::from_envelope(self)
    }

    /// String field of `data`, if present.
    pub(crate) fn data_str(&self, field: &str) -> Option<&str> {
        self.data.as_ref()?.get(field)?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn chat_serializes_to_relay_shape() {
        let payload = EncryptedPayload { nonce: [1; 12], ciphertext: vec![2; 20] };
        let envelope = Envelope::chat("general", &payload, ts(0));

        let value: Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "chat");
        assert_eq!(value["roomId"], "general");
        assert_eq!(value["encrypted"]["keyId"], "general");
        assert_eq!(value["encrypted"]["iv"], STANDARD.encode([1u8; 12]));
        assert_eq!(value["encrypted"]["ciphertext"], STANDARD.encode([2u8; 20]));
        assert_eq!(value["timestamp"], "1970-01-01T00:00:00Z");
        assert!(value.get("content").is_none());
        assert!(value.get("recipient").is_none());
    }

    #[test]
    fn room_key_serializes_to_relay_shape() {
        let envelope = Envelope::room_key("general", "bob", "S0VZ");
        let value: Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "room_key");
        assert_eq!(value["roomId"], "general");
        assert_eq!(value["recipient"], "bob");
        assert_eq!(value["data"]["key"], "S0VZ");
    }

    #[test]
    fn request_key_serializes_to_relay_shape() {
        let value: Value =
            serde_json::from_str(&Envelope::request_key("general").encode().unwrap()).unwrap();

        assert_eq!(value, json!({ "type": "request_key", "roomId": "general" }));
    }

    #[test]
    fn decodes_relay_stamped_envelope() {
        let json = r#"{
            "type": "request_key",
            "username": "alice",
            "roomId": "general",
            "timestamp": "0001-01-01T00:00:00Z"
        }"#;

        let envelope = Envelope::decode(json).unwrap();

        assert_eq!(envelope.kind, EnvelopeType::RequestKey);
        assert_eq!(envelope.username.as_deref(), Some("alice"));
        assert_eq!(envelope.room_id.as_deref(), Some("general"));
        assert!(envelope.timestamp.is_some());
    }

    #[test]
    fn decodes_fractional_second_timestamps() {
        let json = r#"{"type":"chat","content":"hi","timestamp":"2024-03-01T12:30:45.123456789+01:00"}"#;

        let envelope = Envelope::decode(json).unwrap();

        assert_eq!(envelope.timestamp.unwrap().to_rfc3339(), "2024-03-01T11:30:45.123456789+00:00");
    }

    #[test]
    fn unknown_type_is_preserved_as_unknown() {
        let envelope = Envelope::decode(r#"{"type":"typing","username":"carol"}"#).unwrap();
        assert_eq!(envelope.kind, EnvelopeType::Unknown);
    }

    #[test]
    fn missing_type_is_rejected() {
        let result = Envelope::decode(r#"{"roomId":"general"}"#);
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(Envelope::decode("not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(Envelope::decode("[]"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn encrypted_data_roundtrips_payload() {
        let payload = EncryptedPayload { nonce: [7; 12], ciphertext: vec![1, 2, 3, 4] };

        let wire = EncryptedData::from_payload(&payload, "general");

        assert_eq!(wire.to_payload().unwrap(), payload);
    }

    #[test]
    fn encrypted_data_rejects_bad_iv() {
        let short_iv = EncryptedData {
            ciphertext: STANDARD.encode([0u8; 16]),
            iv: STANDARD.encode([0u8; 8]),
            key_id: None,
        };
        assert!(matches!(
            short_iv.to_payload(),
            Err(ProtocolError::InvalidEncoding { field: "iv", .. })
        ));

        let not_base64 =
            EncryptedData { ciphertext: "%%%".to_string(), iv: STANDARD.encode([0u8; 12]), key_id: None };
        assert!(matches!(
            not_base64.to_payload(),
            Err(ProtocolError::InvalidEncoding { field: "ciphertext", .. })
        ));
    }

    #[test]
    fn relay_notices_parse_back() {
        let joined = Envelope::membership("bob", MembershipChange::Joined);
        let list = Envelope::user_list(["alice", "bob"]);

        let joined = Envelope::decode(&joined.encode().unwrap()).unwrap();
        let list = Envelope::decode(&list.encode().unwrap()).unwrap();

        match joined.payload().unwrap() {
            Payload::System(notice) => {
                assert_eq!(notice.change, Some(MembershipChange::Joined));
                assert_eq!(notice.username.as_deref(), Some("bob"));
                assert_eq!(notice.content.as_deref(), Some("bob joined the chat"));
            },
            other => panic!("expected system notice, got {other:?}"),
        }
        assert_eq!(list.payload().unwrap(), Payload::UserList(vec![
            "alice".to_string(),
            "bob".to_string()
        ]));
    }
}
