//! Symmetric room key and its transmissible encoding.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use zeroize::Zeroize;

use crate::error::CipherError;

/// Size of a room key in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// A 256-bit symmetric room key.
///
/// Key bytes are zeroized on drop. `Debug` never prints the material, so a
/// key can sit inside structures that are logged.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Wrap raw key bytes. Callers generating a key must supply bytes from a
    /// cryptographically secure source.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Standard base64 of the raw key, as stored on disk and shared in
    /// `room_key` envelopes.
    pub fn encode(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Parse a base64-encoded key.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyEncoding`: input is not base64
    /// - `InvalidKeyLength`: input does not decode to exactly 32 bytes
    pub fn decode(encoded: &str) -> Result<Self, CipherError> {
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CipherError::InvalidKeyEncoding { reason: e.to_string() })?;

        let result = <[u8; KEY_SIZE]>::try_from(raw.as_slice())
            .map(Self::from_bytes)
            .map_err(|_| CipherError::InvalidKeyLength { expected: KEY_SIZE, actual: raw.len() });

        raw.zeroize();
        result
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([redacted])")
    }
}
