//! Access-layer error types.

use medgate_core::error::MedgateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("encryption key is not configured")]
    KeyMissing,

    #[error("encryption key is not valid base64")]
    KeyEncoding,

    #[error("encryption key must be {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("field encryption failed")]
    EncryptFailed,

    /// The reason is for local diagnostics only and never includes
    /// ciphertext or plaintext.
    #[error("field decryption failed: {0}")]
    DecryptFailed(&'static str),

    #[error("sensitive field {field} must be a string")]
    NonStringField { field: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<AccessError> for MedgateError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::DecryptFailed(_) => MedgateError::Decryption,
            AccessError::NonStringField { .. } => MedgateError::Validation {
                message: err.to_string(),
            },
            AccessError::KeyMissing
            | AccessError::KeyEncoding
            | AccessError::InvalidKeyLength { .. }
            | AccessError::EncryptFailed
            | AccessError::Config(_) => MedgateError::Encryption(err.to_string()),
        }
    }
}
