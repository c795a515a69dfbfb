//! In-memory repository implementations.

mod audit;
mod consent;
mod record;

pub use audit::InMemoryAuditLogRepository;
pub use consent::InMemoryConsentRepository;
pub use record::InMemoryRecordStore;
