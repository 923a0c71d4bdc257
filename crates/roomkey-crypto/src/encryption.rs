//! Message encryption using `AES-256-GCM`
//!
//! All functions are pure - the nonce must be provided by the caller.
//! This enables deterministic testing and keeps the client Sans-IO.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};

use crate::{error::CipherError, key::SymmetricKey};

/// Size of the GCM nonce (96 bits).
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Ciphertext and the nonce it was sealed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// The 12-byte GCM nonce
    pub nonce: [u8; NONCE_SIZE],
    /// The ciphertext including the 16-byte tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Build a payload from untyped nonce bytes (as decoded from the wire).
    ///
    /// # Errors
    ///
    /// - `InvalidNonceLength`: nonce is not 12 bytes
    pub fn from_parts(nonce: &[u8], ciphertext: Vec<u8>) -> Result<Self, CipherError> {
        let nonce = <[u8; NONCE_SIZE]>::try_from(nonce).map_err(|_| {
            CipherError::InvalidNonceLength { expected: NONCE_SIZE, actual: nonce.len() }
        })?;
        Ok(Self { nonce, ciphertext })
    }

    /// Plaintext length (ciphertext length minus authentication tag).
    pub fn plaintext_len(&self) -> usize {
        self.ciphertext.len().saturating_sub(TAG_SIZE)
    }
}

/// Encrypt a message under a room key.
///
/// # Security
///
/// - Caller MUST supply a nonce drawn fresh from a cryptographically secure
///   source for every call; reusing a nonce with the same key breaks GCM
/// - Same key and nonce always produce the same ciphertext
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey, nonce: [u8; NONCE_SIZE]) -> EncryptedPayload {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), plaintext) else {
        unreachable!("AES-256-GCM encryption cannot fail for inputs below 64 GiB");
    };

    EncryptedPayload { nonce, ciphertext }
}

/// Decrypt a message under a room key.
///
/// Returns the plaintext only after the tag verifies.
///
/// # Errors
///
/// - `AuthenticationFailed`: wrong key, tampered or truncated ciphertext,
///   or altered nonce
pub fn decrypt(encrypted: &EncryptedPayload, key: &SymmetricKey) -> Result<Vec<u8>, CipherError> {
    if encrypted.ciphertext.len() < TAG_SIZE {
        return Err(CipherError::AuthenticationFailed);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(Nonce::from_slice(&encrypted.nonce), encrypted.ciphertext.as_slice())
        .map_err(|_| CipherError::AuthenticationFailed)
}
