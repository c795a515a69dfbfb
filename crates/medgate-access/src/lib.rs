//! Access mediation for protected health information.
//!
//! Every read or write of a protected entity goes through
//! [`AccessMediator`], which checks the caller's roles, checks patient
//! consent for clinical writes, encrypts or decrypts the sensitive
//! fields, and appends exactly one entry to the audit trail.

pub mod audit;
pub mod authorizer;
pub mod config;
pub mod consent;
pub mod crypto;
pub mod error;
pub mod mediator;

pub use audit::AuditRecorder;
pub use authorizer::{AccessAction, AuthzDecision, DenyReason, RoleAuthorizer};
pub use config::AccessConfig;
pub use consent::ConsentRegistry;
pub use crypto::FieldEncryptionEngine;
pub use error::AccessError;
pub use mediator::{AccessMediator, MediationRequest, MediationResponse, MediationState};
