//! Fuzz target for the key exchange state machine
//!
//! Drives a single client with an arbitrary sequence of chats, shares,
//! requests and joins, mixing well-formed and garbage key material.
//!
//! # Invariants
//!
//! - The client NEVER panics
//! - A successful import leaves the room with a key
//! - Every undecryptable chat yields exactly one placeholder and one request
//! - Pending queues never exceed their bound

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use roomkey_client::{Client, ClientAction, ClientEvent, ClientIdentity, RoomKeyState};
use roomkey_core::storage::MemoryKeyStore;
use roomkey_crypto::{SymmetricKey, encrypt};
use roomkey_harness::SimEnv;
use roomkey_proto::payloads::ChatBody;

const MAX_PENDING: usize = 8;

#[derive(Debug, Arbitrary)]
struct Scenario {
    seed: u64,
    keys: [[u8; 32]; 3],
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    Send { room: u8, text: Vec<u8> },
    Chat { room: u8, key_idx: u8, nonce: [u8; 12], text: Vec<u8> },
    PlainChat { room: u8, text: String },
    Share { room: u8, key_idx: u8 },
    GarbageShare { room: u8, encoded: String },
    Request { room: u8, requester: Option<String> },
    Join { room: u8, username: String },
    Logout,
}

fn room(id: u8) -> String {
    format!("room-{}", id % 3)
}

fuzz_target!(|scenario: Scenario| {
    let mut client = Client::new(
        SimEnv::with_seed(scenario.seed),
        ClientIdentity::new("fuzzer"),
        MemoryKeyStore::new(),
    )
    .with_max_pending_per_room(MAX_PENDING);
    let keys = scenario.keys.map(SymmetricKey::from_bytes);

    for op in scenario.operations {
        match op {
            Operation::Send { room: id, text } => {
                let event = ClientEvent::SendMessage { room_id: room(id), plaintext: text };
                let actions = client.handle(event).expect("send with a memory store");
                assert!(matches!(&actions[..], [ClientAction::Send(_)]));
            },
            Operation::Chat { room: id, key_idx, nonce, text } => {
                let key = &keys[usize::from(key_idx) % keys.len()];
                let event = ClientEvent::ChatReceived {
                    room_id: room(id),
                    sender: Some("peer".to_string()),
                    timestamp: None,
                    body: ChatBody::Encrypted(encrypt(&text, key, nonce)),
                };
                let actions = client.handle(event).expect("chat with a memory store");

                let delivered =
                    actions.iter().any(|a| matches!(a, ClientAction::DeliverMessage { .. }));
                let pending =
                    actions.iter().filter(|a| matches!(a, ClientAction::KeyPending { .. })).count();
                let requests =
                    actions.iter().filter(|a| matches!(a, ClientAction::Send(_))).count();
                assert!(delivered || (pending == 1 && requests == 1));
                assert!(client.pending_count(&room(id)) <= MAX_PENDING);
            },
            Operation::PlainChat { room: id, text } => {
                let event = ClientEvent::ChatReceived {
                    room_id: room(id),
                    sender: None,
                    timestamp: None,
                    body: ChatBody::Plain(text),
                };
                let _ = client.handle(event);
            },
            Operation::Share { room: id, key_idx } => {
                let key = &keys[usize::from(key_idx) % keys.len()];
                let event = ClientEvent::KeyShareReceived {
                    room_id: room(id),
                    sender: Some("peer".to_string()),
                    encoded_key: key.encode(),
                };
                client.handle(event).expect("valid share");
                assert_eq!(client.room_state(&room(id)).ok(), Some(RoomKeyState::HasKey));
            },
            Operation::GarbageShare { room: id, encoded } => {
                let event =
                    ClientEvent::KeyShareReceived { room_id: room(id), sender: None, encoded_key: encoded };
                let _ = client.handle(event);
            },
            Operation::Request { room: id, requester } => {
                let _ = client.handle(ClientEvent::KeyRequestReceived { room_id: room(id), requester });
            },
            Operation::Join { room: id, username } => {
                let _ = client.handle(ClientEvent::PeerJoined { room_id: room(id), username });
            },
            Operation::Logout => {
                client.handle(ClientEvent::Logout).expect("logout with a memory store");
                for id in 0..3 {
                    assert_eq!(client.room_state(&room(id)).ok(), Some(RoomKeyState::NoKey));
                }
            },
        }
    }
});
