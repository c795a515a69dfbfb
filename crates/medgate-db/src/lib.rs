//! MedGate database: in-memory repository implementations.
//!
//! This crate provides:
//! - Lock-guarded stores for consents, audit entries and protected
//!   records ([`repository`])
//! - Error types ([`DbError`])
//!
//! Every store is a cheap `Clone` handle over shared state, so one
//! instance can be handed to each component that needs it.

mod error;
pub mod repository;

pub use error::DbError;
