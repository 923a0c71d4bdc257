//! Roomkey relay protocol.
//!
//! The relay forwards JSON objects it never decrypts. Every object is an
//! [`Envelope`] whose `type` field selects how the remaining fields are read:
//!
//! | `type`        | Direction     | Relay behavior                         |
//! |---------------|---------------|----------------------------------------|
//! | `chat`        | both          | broadcast to the room, sender included |
//! | `room_key`    | both          | delivered to `recipient` only          |
//! | `request_key` | both          | fanned out to every other room member  |
//! | `system`      | relay → peer  | join / leave notices                   |
//! | `user_list`   | relay → peer  | current roster                         |
//!
//! [`Envelope::payload`] turns an envelope into a typed [`Payload`]. Byte
//! strings (ciphertext, nonce, key) travel as standard base64.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod error;
pub mod payloads;

pub use envelope::{EncryptedData, Envelope, EnvelopeType};
pub use error::ProtocolError;
pub use payloads::Payload;
