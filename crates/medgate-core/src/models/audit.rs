//! Audit trail domain model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Read,
    Create,
    Update,
    Delete,
    Search,
    Export,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditAction::Read => "READ",
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Search => "SEARCH",
            AuditAction::Export => "EXPORT",
        };
        f.write_str(name)
    }
}

/// An appended, immutable audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub id: u64,
    pub user_id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub http_method: String,
    pub endpoint: String,
    pub ip_address: String,
    pub status_code: u16,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Stored (encrypted) form of the entity before the change.
    pub old_values: Option<String>,
    /// Stored (encrypted) form of the entity after the change.
    pub new_values: Option<String>,
    pub details: Option<String>,
    /// Hex SHA-256 of the preceding entry, empty for the first one.
    pub prev_hash: String,
    pub hash: String,
}

/// Input for appending an audit entry. Id, timestamp and chain hashes
/// are assigned by the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateAuditEntry {
    pub user_id: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    pub http_method: String,
    pub endpoint: String,
    pub ip_address: String,
    pub status_code: u16,
    pub success: bool,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub details: Option<String>,
}
