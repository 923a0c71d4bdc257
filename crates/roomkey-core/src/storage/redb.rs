//! Redb-backed durable key store.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Keys survive process restarts.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use roomkey_crypto::SymmetricKey;

use super::{ENTRY_PREFIX, KeyStore, StorageError, decode_entry, entry_name};

/// Table: `room_keys`
/// Key: `room_key_<roomId>`
/// Value: base64 of the 32-byte key
const ROOM_KEYS: TableDefinition<&str, &str> = TableDefinition::new("room_keys");

/// Durable key store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbKeyStore {
    db: Arc<Database>,
}

impl RedbKeyStore {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the `room_keys` table if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(ROOM_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), "opened key store");

        Ok(Self { db: Arc::new(db) })
    }

    fn read_entry(&self, name: &str) -> Result<Option<String>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(ROOM_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

        let entry = table.get(name).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(entry.map(|value| value.value().to_string()))
    }
}

impl KeyStore for RedbKeyStore {
    fn put(&self, room_id: &str, key: &SymmetricKey) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(ROOM_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

            let name = entry_name(room_id);
            let encoded = key.encode();
            table
                .insert(name.as_str(), encoded.as_str())
                .map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn get(&self, room_id: &str) -> Result<Option<SymmetricKey>, StorageError> {
        self.read_entry(&entry_name(room_id))?
            .map(|encoded| decode_entry(room_id, &encoded))
            .transpose()
    }

    fn contains(&self, room_id: &str) -> Result<bool, StorageError> {
        Ok(self.read_entry(&entry_name(room_id))?.is_some())
    }

    fn remove(&self, room_id: &str) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(ROOM_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

            let name = entry_name(room_id);
            table.remove(name.as_str()).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn rooms(&self) -> Result<Vec<String>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(ROOM_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

        let mut rooms = Vec::new();
        for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
            let (name, _) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
            if let Some(room_id) = name.value().strip_prefix(ENTRY_PREFIX) {
                rooms.push(room_id.to_string());
            }
        }

        Ok(rooms)
    }

    fn clear(&self) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let mut table =
                txn.open_table(ROOM_KEYS).map_err(|e| StorageError::Io(e.to_string()))?;

            let mut names = Vec::new();
            for entry in table.iter().map_err(|e| StorageError::Io(e.to_string()))? {
                let (name, _) = entry.map_err(|e| StorageError::Io(e.to_string()))?;
                names.push(name.value().to_string());
            }

            for name in &names {
                table.remove(name.as_str()).map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }
}
