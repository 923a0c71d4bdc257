//! Error types for room key operations.

use thiserror::Error;

/// Errors from key encoding and AEAD operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Tag verification failed: wrong key, tampered ciphertext or nonce,
    /// or truncated input.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Encoded key is not valid base64.
    #[error("invalid key encoding: {reason}")]
    InvalidKeyEncoding {
        /// Decoder message
        reason: String,
    },

    /// Decoded key has the wrong length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length in bytes
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },

    /// Nonce has the wrong length.
    #[error("invalid nonce length: expected {expected}, got {actual}")]
    InvalidNonceLength {
        /// Required length in bytes
        expected: usize,
        /// Length that was supplied
        actual: usize,
    },
}
