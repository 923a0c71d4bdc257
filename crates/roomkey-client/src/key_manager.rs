//! Per-session room key cache.
//!
//! The `KeyManager` owns every room key the session holds. The cache is the
//! single source of truth while the session runs; the [`KeyStore`] mirrors it
//! so keys survive restarts.
//!
//! # Invariants
//!
//! - At most one key per room. Import always overwrites.
//! - Every cached key is also in the store. Writes hit the store first, so a
//!   failed write leaves the cache untouched.
//! - Generating a key never shares it. Dissemination belongs to
//!   [`Client`](crate::Client).

use std::collections::HashMap;

use roomkey_core::{
    env::Environment,
    storage::{KeyStore, StorageError},
};
use roomkey_crypto::{KEY_SIZE, SymmetricKey};
use zeroize::Zeroize;

use crate::error::ClientError;

/// A room's active key.
#[derive(Debug, Clone)]
pub struct RoomKey {
    key: SymmetricKey,
    created_at: u64,
}

impl RoomKey {
    /// Key material.
    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Seconds since the Unix epoch at which this session first held the key
    /// (generated, imported or loaded from the store).
    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// Room key cache backed by a durable store.
pub struct KeyManager<E: Environment, S: KeyStore> {
    env: E,
    store: S,
    cache: HashMap<String, RoomKey>,
}

impl<E: Environment, S: KeyStore> KeyManager<E, S> {
    /// Create an empty cache over `store`.
    pub fn new(env: E, store: S) -> Self {
        Self { env, store, cache: HashMap::new() }
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cached entry for a room. Does not consult the store.
    pub fn room_key(&self, room_id: &str) -> Option<&RoomKey> {
        self.cache.get(room_id)
    }

    /// Rooms with a cached key.
    pub fn cached_rooms(&self) -> impl Iterator<Item = &str> {
        self.cache.keys().map(String::as_str)
    }

    /// Whether the cache or the store holds a key, without loading it.
    pub fn has_key(&self, room_id: &str) -> Result<bool, ClientError> {
        if self.cache.contains_key(room_id) {
            return Ok(true);
        }
        Ok(self.store.contains(room_id)?)
    }

    /// Key for a room, loading it from the store on a cache miss.
    ///
    /// Never generates. `None` if neither cache nor store holds a key.
    pub fn key(&mut self, room_id: &str) -> Result<Option<&SymmetricKey>, ClientError> {
        if !self.cache.contains_key(room_id) {
            let Some(key) = self.store.get(room_id)? else {
                return Ok(None);
            };
            tracing::debug!(room_id, "loaded room key from store");
            self.install(room_id, key);
        }
        Ok(self.cache.get(room_id).map(RoomKey::key))
    }

    /// Load a room's key, generating and persisting one if none exists.
    ///
    /// A stored entry that no longer decodes counts as absent and is
    /// overwritten. Returns `true` if a new key was generated.
    pub fn init_room(&mut self, room_id: &str) -> Result<bool, ClientError> {
        match self.key(room_id).map(|key| key.is_some()) {
            Ok(true) => return Ok(false),
            Ok(false) => {},
            Err(ClientError::Storage(StorageError::Corrupted { reason, .. })) => {
                tracing::warn!(room_id, %reason, "discarding corrupted stored key");
            },
            Err(err) => return Err(err),
        }

        let key = self.generate();
        self.store.put(room_id, &key)?;
        self.install(room_id, key);

        tracing::info!(room_id, "generated room key");
        Ok(true)
    }

    /// Key for a room: cached, else stored, else freshly generated.
    pub fn ensure_key(&mut self, room_id: &str) -> Result<&SymmetricKey, ClientError> {
        self.init_room(room_id)?;
        self.cache
            .get(room_id)
            .map(RoomKey::key)
            .ok_or_else(|| ClientError::KeyUnavailable { room_id: room_id.to_string() })
    }

    /// Transmissible (base64) encoding of a room's key, if one exists.
    pub fn export_key_encoded(&mut self, room_id: &str) -> Result<Option<String>, ClientError> {
        Ok(self.key(room_id)?.map(SymmetricKey::encode))
    }

    /// Decode and install a key, overwriting any prior key for the room.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyShare`: `encoded` is not a base64 256-bit key; the
    ///   existing key (if any) is kept
    /// - `Storage`: the store rejected the write; the cache is unchanged
    pub fn import_key(&mut self, room_id: &str, encoded: &str) -> Result<(), ClientError> {
        let key = SymmetricKey::decode(encoded).map_err(|e| ClientError::InvalidKeyShare {
            room_id: room_id.to_string(),
            reason: e.to_string(),
        })?;

        self.store.put(room_id, &key)?;
        let replaced = self.cache.contains_key(room_id);
        self.install(room_id, key);

        tracing::info!(room_id, replaced, "imported room key");
        Ok(())
    }

    /// Drop a room's key from cache and store.
    pub fn evict(&mut self, room_id: &str) -> Result<(), ClientError> {
        self.store.remove(room_id)?;
        self.cache.remove(room_id);

        tracing::debug!(room_id, "evicted room key");
        Ok(())
    }

    /// Drop every room's key from cache and store.
    ///
    /// The cache is emptied even if the store fails.
    pub fn clear(&mut self) -> Result<(), ClientError> {
        self.cache.clear();
        self.store.clear()?;
        Ok(())
    }

    fn install(&mut self, room_id: &str, key: SymmetricKey) {
        let created_at = self.env.wall_clock_secs();
        self.cache.insert(room_id.to_string(), RoomKey { key, created_at });
    }

    fn generate(&self) -> SymmetricKey {
        let mut bytes = [0u8; KEY_SIZE];
        self.env.random_bytes(&mut bytes);
        let key = SymmetricKey::from_bytes(bytes);
        bytes.zeroize();
        key
    }
}
