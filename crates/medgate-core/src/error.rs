//! Error types for the MEDGATE system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MedgateError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Authorization denied: {reason}")]
    AuthorizationDenied { reason: String },

    #[error("No active consent of type {consent_type} for patient {patient_id}")]
    ConsentMissing {
        patient_id: i64,
        consent_type: String,
    },

    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Deliberately carries no detail: ciphertext, key material and
    /// partial plaintext never leave the crypto layer.
    #[error("Decryption failed")]
    Decryption,

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MedgateError {
    /// HTTP-equivalent status code exposed to callers and recorded in
    /// the audit trail.
    pub fn status_code(&self) -> u16 {
        match self {
            MedgateError::AuthenticationFailed { .. } => 401,
            MedgateError::AuthorizationDenied { .. } | MedgateError::ConsentMissing { .. } => 403,
            MedgateError::Validation { .. } => 400,
            MedgateError::NotFound { .. } => 404,
            MedgateError::Encryption(_)
            | MedgateError::Decryption
            | MedgateError::AuditWrite(_)
            | MedgateError::Storage(_)
            | MedgateError::Internal(_) => 500,
        }
    }
}

pub type MedgateResult<T> = Result<T, MedgateError>;
