//! Database-specific error types and conversions.

use medgate_core::error::MedgateError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Store lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<DbError> for MedgateError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => MedgateError::NotFound { entity, id },
            other => MedgateError::Storage(other.to_string()),
        }
    }
}
