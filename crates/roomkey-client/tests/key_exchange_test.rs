//! End-to-end key exchange tests over the wire format.
//!
//! Envelopes are encoded to JSON and decoded again between clients, and
//! routed through [`MessageRouter`] exactly as a session would.

use roomkey_client::{
    Client, ClientAction, ClientEvent, ClientIdentity, MessageRouter, Route, RoomKeyState,
};
use roomkey_core::storage::{KeyStore, MemoryKeyStore};
use roomkey_crypto::{SymmetricKey, encrypt};
use roomkey_harness::SimEnv;
use roomkey_proto::{Envelope, EnvelopeType};

fn client(name: &str) -> Client<SimEnv, MemoryKeyStore> {
    Client::new(SimEnv::with_seed(42), ClientIdentity::new(name), MemoryKeyStore::new())
}

fn wire(envelope: &Envelope) -> Envelope {
    Envelope::decode(&envelope.encode().unwrap()).unwrap()
}

/// Route an envelope and feed every protocol event into the client.
fn deliver(
    client: &mut Client<SimEnv, MemoryKeyStore>,
    router: &mut MessageRouter,
    envelope: &Envelope,
) -> Vec<ClientAction> {
    let mut actions = Vec::new();
    for route in router.route(&wire(envelope)).unwrap() {
        if let Route::Protocol(event) = route {
            actions.extend(client.handle(event).unwrap());
        }
    }
    actions
}

fn sent(actions: &[ClientAction]) -> Vec<Envelope> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::Send(envelope) => Some(envelope.clone()),
            _ => None,
        })
        .collect()
}

fn delivered(actions: &[ClientAction]) -> Vec<Vec<u8>> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::DeliverMessage { plaintext, .. } => Some(plaintext.clone()),
            _ => None,
        })
        .collect()
}

/// Client A has no key for `general`, receives a chat under K1, asks for the
/// key, receives K1, and can then read the chat.
#[test]
fn recovery_scenario() {
    let mut a = client("alice");
    let mut router = MessageRouter::new("alice", "general");
    let k1 = SymmetricKey::from_bytes([0x11; 32]);

    let mut e1 = Envelope::chat(
        "general",
        &encrypt(b"hello", &k1, [3; 12]),
        chrono::DateTime::default(),
    );
    e1.username = Some("bob".to_string());

    let actions = deliver(&mut a, &mut router, &e1);
    let requests = sent(&actions);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].kind, EnvelopeType::RequestKey);
    assert_eq!(requests[0].room_id.as_deref(), Some("general"));
    assert!(matches!(actions[0], ClientAction::KeyPending { .. }));

    let share = Envelope::room_key("general", "alice", &k1.encode());
    let actions = deliver(&mut a, &mut router, &share);
    assert!(a.keys().has_key("general").unwrap());
    assert_eq!(delivered(&actions), vec![b"hello".to_vec()]);

    let actions = deliver(&mut a, &mut router, &e1);
    assert_eq!(delivered(&actions), vec![b"hello".to_vec()]);
    assert!(sent(&actions).is_empty());
}

#[test]
fn key_request_round_trip_between_clients() {
    let mut alice = client("alice");
    let mut bob = client("bob");
    let mut alice_router = MessageRouter::new("alice", "general");
    let mut bob_router = MessageRouter::new("bob", "general");

    let actions = alice
        .handle(ClientEvent::SendMessage {
            room_id: "general".to_string(),
            plaintext: b"hi bob".to_vec(),
        })
        .unwrap();
    let mut chat = sent(&actions).remove(0);
    chat.username = Some("alice".to_string());

    let actions = deliver(&mut bob, &mut bob_router, &chat);
    let mut request = sent(&actions).remove(0);
    request.username = Some("bob".to_string());

    let actions = deliver(&mut alice, &mut alice_router, &request);
    let share = sent(&actions).remove(0);
    assert_eq!(share.kind, EnvelopeType::RoomKey);
    assert_eq!(share.recipient.as_deref(), Some("bob"));

    let actions = deliver(&mut bob, &mut bob_router, &share);
    assert_eq!(delivered(&actions), vec![b"hi bob".to_vec()]);
    assert_eq!(bob.room_state("general").unwrap(), RoomKeyState::HasKey);
    assert_eq!(
        bob.keys_mut().export_key_encoded("general").unwrap(),
        alice.keys_mut().export_key_encoded("general").unwrap()
    );
}

#[test]
fn join_notice_triggers_exactly_one_share() {
    let mut alice = client("alice");
    let mut router = MessageRouter::new("alice", "general");
    alice.keys_mut().ensure_key("general").unwrap();

    let joined = Envelope::decode(
        r#"{"type":"system","username":"carol","roomId":"general","content":"carol joined the chat","data":{"event":"user_joined"}}"#,
    )
    .unwrap();

    let shares = sent(&deliver(&mut alice, &mut router, &joined));
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[0].recipient.as_deref(), Some("carol"));

    let own = Envelope::decode(
        r#"{"type":"system","username":"alice","data":{"event":"user_joined"}}"#,
    )
    .unwrap();
    assert!(sent(&deliver(&mut alice, &mut router, &own)).is_empty());
}

#[test]
fn share_for_another_user_does_not_overwrite() {
    let mut alice = client("alice");
    let mut router = MessageRouter::new("alice", "general");
    let original = alice.keys_mut().ensure_key("general").unwrap().clone();

    let misaddressed =
        Envelope::room_key("general", "bob", &SymmetricKey::from_bytes([9; 32]).encode());
    deliver(&mut alice, &mut router, &misaddressed);

    assert_eq!(alice.keys_mut().key("general").unwrap(), Some(&original));
}

#[test]
fn stored_key_survives_new_session() {
    let store = MemoryKeyStore::new();
    let mut first = Client::new(SimEnv::new(), ClientIdentity::new("alice"), store.clone());
    first.keys_mut().ensure_key("general").unwrap();
    let key = first.keys_mut().export_key_encoded("general").unwrap();

    let mut second = Client::new(SimEnv::with_seed(9), ClientIdentity::new("alice"), store.clone());

    assert_eq!(second.room_state("general").unwrap(), RoomKeyState::HasKey);
    assert_eq!(second.keys_mut().export_key_encoded("general").unwrap(), key);
    assert!(store.contains("general").unwrap());
}
