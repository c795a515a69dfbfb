//! Domain models for MEDGATE.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod consent;
pub mod identity;
pub mod record;
pub mod schema;
