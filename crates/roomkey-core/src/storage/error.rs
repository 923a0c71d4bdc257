//! Storage error types.

use thiserror::Error;

/// Errors from [`super::KeyStore`] implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend I/O or transaction failure.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A stored entry could not be decoded into a key.
    #[error("corrupted key entry for room {room_id}: {reason}")]
    Corrupted {
        /// Room whose entry is unreadable
        room_id: String,
        /// Decoder message
        reason: String,
    },

    /// Failure injected by [`super::ChaoticKeyStore`].
    #[error("injected storage failure during {operation}")]
    Injected {
        /// Operation that was failed
        operation: &'static str,
    },
}
