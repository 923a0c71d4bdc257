//! Client
//!
//! Room key management and the key exchange state machine for end-to-end
//! encrypted group chat over an untrusted relay.
//!
//! # Architecture
//!
//! The client is Sans-IO and action based. [`Client`] receives events
//! ([`ClientEvent`]), processes them through pure state machine logic, and
//! returns actions ([`ClientAction`]) for the caller to execute. All
//! randomness and time come from an [`Environment`], all persistence from a
//! [`KeyStore`].
//!
//! ```text
//!  relay ──Envelope──► MessageRouter ──ClientEvent──► Client ──ClientAction──► Session
//!                           │                           │                        │
//!                           └──SessionEvent─────────────┼──────────► SessionObserver
//!                                                       ▼                        │
//!                                                  KeyManager               Transport
//!                                                       │
//!                                                   KeyStore
//! ```
//!
//! # Components
//!
//! - [`KeyManager`]: Per-session key cache backed by a [`KeyStore`]
//! - [`Client`]: Per-room `NoKey`/`HasKey` key exchange state machine
//! - [`MessageRouter`]: Dispatches inbound envelopes by declared type
//! - [`Session`]: Wires the above to a [`Transport`] and a [`SessionObserver`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod config;
mod error;
mod event;
mod key_manager;
mod observer;
mod router;
mod session;
mod transport;

pub use client::{Client, ClientIdentity, RoomKeyState};
pub use config::SessionConfig;
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
pub use key_manager::{KeyManager, RoomKey};
pub use observer::{SessionEvent, SessionObserver};
pub use roomkey_core::{env::Environment, storage::KeyStore};
pub use router::{MessageRouter, Route};
pub use session::Session;
pub use transport::{ConnectionStatus, Transport};
