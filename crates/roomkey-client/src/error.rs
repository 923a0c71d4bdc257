//! Client error types.

use roomkey_core::storage::StorageError;
use roomkey_crypto::CipherError;
use roomkey_proto::ProtocolError;
use thiserror::Error;

/// Errors from client operations.
///
/// None of these is fatal to a session. Decryption failures never reach the
/// caller at all: they are turned into a key request by the state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Authenticated encryption failed.
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    /// Key store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Envelope could not be read.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Send attempted while disconnected.
    #[error("transport unavailable")]
    TransportUnavailable,

    /// No cached or stored key for the room.
    #[error("no key for room {room_id}")]
    KeyUnavailable {
        /// Room without a key
        room_id: String,
    },

    /// Received key material could not be decoded.
    ///
    /// The import is aborted and any existing key for the room is kept.
    #[error("invalid key share for room {room_id}: {reason}")]
    InvalidKeyShare {
        /// Room the share was for
        room_id: String,
        /// Decoder message
        reason: String,
    },
}
