//! Roomkey Cryptographic Primitives
//!
//! Cryptographic building blocks for room encryption. Pure functions with
//! deterministic outputs. Callers provide random bytes (key material and
//! nonces) so that tests can run against a seeded source.
//!
//! # Key Model
//!
//! Each room has exactly one 256-bit symmetric key at a time. Anyone in the
//! room may mint it or overwrite it; there is no ratchet and no epoch.
//!
//! ```text
//! 32 random bytes ──► SymmetricKey ──► base64 (storage / room_key share)
//!                          │
//!                          ▼
//! plaintext + 12 random bytes ──► AES-256-GCM ──► EncryptedPayload
//! ```
//!
//! # Security
//!
//! Confidentiality:
//! - AES-256-GCM with a fresh 96-bit nonce per message
//! - Nonces are never derived from message content or counters
//!
//! Authenticity:
//! - The GCM tag covers the whole ciphertext; any flipped bit in the
//!   ciphertext, nonce, or key fails decryption
//! - Decryption never returns unverified plaintext
//!
//! Not provided:
//! - Forward secrecy: a leaked room key exposes every message under it
//! - Sender authentication of key material

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod encryption;
mod error;
mod key;

pub use encryption::{EncryptedPayload, NONCE_SIZE, TAG_SIZE, decrypt, encrypt};
pub use error::CipherError;
pub use key::{KEY_SIZE, SymmetricKey};
