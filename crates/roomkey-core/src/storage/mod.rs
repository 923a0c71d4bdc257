//! Room key storage.
//!
//! Trait-based abstraction for persisting room keys on the local device. The
//! trait is synchronous (no async): every call is a short local operation
//! issued from the single control thread that drives the client.
//!
//! Each room occupies one entry named `room_key_<roomId>` whose value is the
//! base64 encoding of the 256-bit key. Material at rest is only protected
//! from the relay, not from someone holding the device.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticKeyStore;
pub use error::StorageError;
pub use memory::MemoryKeyStore;
use roomkey_crypto::SymmetricKey;

pub use self::redb::RedbKeyStore;

/// Prefix of every persisted entry name.
pub const ENTRY_PREFIX: &str = "room_key_";

/// Persisted entry name for a room.
pub fn entry_name(room_id: &str) -> String {
    format!("{ENTRY_PREFIX}{room_id}")
}

/// Decode a persisted entry value.
pub(crate) fn decode_entry(room_id: &str, encoded: &str) -> Result<SymmetricKey, StorageError> {
    SymmetricKey::decode(encoded)
        .map_err(|e| StorageError::Corrupted { room_id: room_id.to_string(), reason: e.to_string() })
}

/// Durable per-device map from room identifier to key.
///
/// Must be Clone (shared between the session and tooling), Send + Sync, and
/// synchronous. Implementations share internal state via Arc, so clones access
/// the same underlying storage.
pub trait KeyStore: Clone + Send + Sync + 'static {
    /// Store the key for a room, replacing any existing entry.
    fn put(&self, room_id: &str, key: &SymmetricKey) -> Result<(), StorageError>;

    /// Load the key for a room.
    ///
    /// Returns `None` if no entry exists.
    fn get(&self, room_id: &str) -> Result<Option<SymmetricKey>, StorageError>;

    /// Whether an entry exists for a room, without decoding it.
    fn contains(&self, room_id: &str) -> Result<bool, StorageError>;

    /// Delete the entry for a room. Deleting a missing entry is a no-op.
    fn remove(&self, room_id: &str) -> Result<(), StorageError>;

    /// List rooms with a stored key. Order is not guaranteed.
    fn rooms(&self) -> Result<Vec<String>, StorageError>;

    /// Delete every room's key.
    fn clear(&self) -> Result<(), StorageError>;
}
