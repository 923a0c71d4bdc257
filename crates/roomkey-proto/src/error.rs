//! Protocol error types.

use thiserror::Error;

use crate::EnvelopeType;

/// Errors from envelope encoding and payload extraction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Envelope is not valid JSON or does not match the envelope schema.
    #[error("malformed envelope: {0}")]
    Json(String),

    /// A field required by the envelope type is absent.
    #[error("{kind:?} envelope is missing `{field}`")]
    MissingField {
        /// Envelope type being read
        kind: EnvelopeType,
        /// Name of the absent field
        field: &'static str,
    },

    /// A byte-string field is not valid base64 or has the wrong length.
    #[error("invalid `{field}` encoding: {reason}")]
    InvalidEncoding {
        /// Name of the offending field
        field: &'static str,
        /// Decoder message
        reason: String,
    },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
