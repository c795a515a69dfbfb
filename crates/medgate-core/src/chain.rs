//! SHA-256 hash chaining of audit entries.
//!
//! Each entry's hash covers all of its fields plus the hash of the entry
//! before it, so editing, dropping or reordering any appended entry is
//! detectable by re-walking the chain.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::audit::{AuditAction, AuditEntry};

#[derive(Serialize)]
struct HashedFields<'a> {
    id: u64,
    user_id: &'a str,
    action: AuditAction,
    entity_type: &'a str,
    entity_id: Option<i64>,
    http_method: &'a str,
    endpoint: &'a str,
    ip_address: &'a str,
    status_code: u16,
    timestamp: &'a DateTime<Utc>,
    success: bool,
    old_values: Option<&'a str>,
    new_values: Option<&'a str>,
    details: Option<&'a str>,
    prev_hash: &'a str,
}

/// Hex SHA-256 over the entry's content and its `prev_hash`. The
/// entry's own `hash` field is not part of the input.
pub fn entry_hash(entry: &AuditEntry) -> String {
    let fields = HashedFields {
        id: entry.id,
        user_id: &entry.user_id,
        action: entry.action,
        entity_type: &entry.entity_type,
        entity_id: entry.entity_id,
        http_method: &entry.http_method,
        endpoint: &entry.endpoint,
        ip_address: &entry.ip_address,
        status_code: entry.status_code,
        timestamp: &entry.timestamp,
        success: entry.success,
        old_values: entry.old_values.as_deref(),
        new_values: entry.new_values.as_deref(),
        details: entry.details.as_deref(),
        prev_hash: &entry.prev_hash,
    };
    // Serializing plain strings, integers and a timestamp cannot fail.
    let canonical = serde_json::to_vec(&fields).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("audit chain broken at entry {entry_id}: {reason}")]
pub struct ChainBreak {
    pub entry_id: u64,
    pub reason: &'static str,
}

/// Verify a chain given in append (ascending id) order.
pub fn verify_chain(entries: &[AuditEntry]) -> Result<(), ChainBreak> {
    let mut prev: Option<&AuditEntry> = None;
    for entry in entries {
        let expected_prev = prev.map(|p| p.hash.as_str()).unwrap_or("");
        if prev.is_some_and(|p| entry.id <= p.id) {
            return Err(ChainBreak {
                entry_id: entry.id,
                reason: "ids out of order",
            });
        }
        if entry.prev_hash != expected_prev {
            return Err(ChainBreak {
                entry_id: entry.id,
                reason: "predecessor hash mismatch",
            });
        }
        if entry.hash != entry_hash(entry) {
            return Err(ChainBreak {
                entry_id: entry.id,
                reason: "content hash mismatch",
            });
        }
        prev = Some(entry);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: u64, prev_hash: &str, success: bool) -> AuditEntry {
        let mut entry = AuditEntry {
            id,
            user_id: "dr-smith".into(),
            action: AuditAction::Read,
            entity_type: "Patient".into(),
            entity_id: Some(1),
            http_method: "GET".into(),
            endpoint: "/api/patients/1".into(),
            ip_address: "10.0.0.1".into(),
            status_code: if success { 200 } else { 403 },
            timestamp: Utc::now(),
            success,
            old_values: None,
            new_values: None,
            details: None,
            prev_hash: prev_hash.into(),
            hash: String::new(),
        };
        entry.hash = entry_hash(&entry);
        entry
    }

    fn chain(len: u64) -> Vec<AuditEntry> {
        let mut out: Vec<AuditEntry> = Vec::new();
        for id in 1..=len {
            let prev = out.last().map(|e| e.hash.clone()).unwrap_or_default();
            out.push(link(id, &prev, id % 2 == 0));
        }
        out
    }

    #[test]
    fn intact_chain_verifies() {
        assert_eq!(verify_chain(&chain(5)), Ok(()));
        assert_eq!(verify_chain(&[]), Ok(()));
    }

    #[test]
    fn edited_entry_is_detected() {
        let mut entries = chain(4);
        entries[2].success = !entries[2].success;
        let err = verify_chain(&entries).unwrap_err();
        assert_eq!(err.entry_id, 3);
        assert_eq!(err.reason, "content hash mismatch");
    }

    #[test]
    fn removed_entry_is_detected() {
        let mut entries = chain(4);
        entries.remove(1);
        let err = verify_chain(&entries).unwrap_err();
        assert_eq!(err.entry_id, 3);
    }

    #[test]
    fn hash_is_hex_sha256() {
        let entry = link(1, "", true);
        assert_eq!(entry.hash.len(), 64);
        assert!(entry.hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
