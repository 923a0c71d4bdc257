use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use roomkey_crypto::SymmetricKey;

use super::{ENTRY_PREFIX, KeyStore, StorageError, decode_entry, entry_name};

/// In-memory key store for testing and simulation.
///
/// Holds the same `room_key_<roomId>` → base64 entries a durable store would,
/// so encoding bugs show up in tests. Clones share one map.
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |entries| entries.len())
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a raw entry value, bypassing encoding.
    ///
    /// Lets tests plant corrupted entries.
    pub fn put_raw(&self, room_id: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(entry_name(room_id), value.to_string());
        Ok(())
    }

    /// Read a raw entry value.
    pub fn get_raw(&self, room_id: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(&entry_name(room_id)).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries.lock().map_err(|_| StorageError::Io("memory store lock poisoned".to_string()))
    }
}

impl KeyStore for MemoryKeyStore {
    fn put(&self, room_id: &str, key: &SymmetricKey) -> Result<(), StorageError> {
        self.lock()?.insert(entry_name(room_id), key.encode());
        Ok(())
    }

    fn get(&self, room_id: &str) -> Result<Option<SymmetricKey>, StorageError> {
        let entries = self.lock()?;
        entries.get(&entry_name(room_id)).map(|encoded| decode_entry(room_id, encoded)).transpose()
    }

    fn contains(&self, room_id: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.contains_key(&entry_name(room_id)))
    }

    fn remove(&self, room_id: &str) -> Result<(), StorageError> {
        self.lock()?.remove(&entry_name(room_id));
        Ok(())
    }

    fn rooms(&self) -> Result<Vec<String>, StorageError> {
        Ok(self
            .lock()?
            .keys()
            .filter_map(|name| name.strip_prefix(ENTRY_PREFIX))
            .map(str::to_string)
            .collect())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([byte; 32])
    }

    #[test]
    fn put_get_roundtrip() {
        let store = MemoryKeyStore::new();

        store.put("general", &key(1)).unwrap();

        assert_eq!(store.get("general").unwrap(), Some(key(1)));
        assert_eq!(store.get("other").unwrap(), None);
    }

    #[test]
    fn entries_use_room_key_prefix_and_base64() {
        let store = MemoryKeyStore::new();

        store.put("general", &key(0)).unwrap();

        let entries = store.entries.lock().unwrap();
        assert_eq!(
            entries.get("room_key_general").map(String::as_str),
            Some("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=")
        );
    }

    #[test]
    fn put_overwrites() {
        let store = MemoryKeyStore::new();

        store.put("general", &key(1)).unwrap();
        store.put("general", &key(2)).unwrap();

        assert_eq!(store.get("general").unwrap(), Some(key(2)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryKeyStore::new();
        let clone = store.clone();

        store.put("general", &key(1)).unwrap();

        assert!(clone.contains("general").unwrap());
    }

    #[test]
    fn corrupted_entry_is_reported() {
        let store = MemoryKeyStore::new();
        store.put_raw("general", "!!!").unwrap();

        assert!(store.contains("general").unwrap());
        assert!(matches!(store.get("general"), Err(StorageError::Corrupted { room_id, .. }) if room_id == "general"));
    }

    #[test]
    fn remove_and_clear() {
        let store = MemoryKeyStore::new();
        store.put("a", &key(1)).unwrap();
        store.put("b", &key(2)).unwrap();

        store.remove("a").unwrap();
        store.remove("missing").unwrap();
        assert_eq!(store.rooms().unwrap(), vec!["b".to_string()]);

        store.clear().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get("b").unwrap(), None);
    }
}
