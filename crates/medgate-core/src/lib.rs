//! MedGate core: domain models, error taxonomy and the repository
//! traits that stand between the access mediator and storage.

pub mod chain;
pub mod error;
pub mod models;
pub mod repository;

pub use error::{MedgateError, MedgateResult};
