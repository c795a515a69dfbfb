//! In-memory implementation of [`AuditLogRepository`].

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use medgate_core::chain;
use medgate_core::error::MedgateResult;
use medgate_core::models::audit::{AuditEntry, CreateAuditEntry};
use medgate_core::repository::{AuditLogFilter, AuditLogRepository};

use crate::error::DbError;

#[derive(Debug)]
struct AuditTable {
    next_id: u64,
    entries: Vec<AuditEntry>,
}

/// Append-only audit log.
///
/// Id, timestamp and chain hash are assigned under one lock, so ids are
/// strictly increasing in append order and the chain never forks.
#[derive(Debug, Clone)]
pub struct InMemoryAuditLogRepository {
    table: Arc<Mutex<AuditTable>>,
}

impl Default for InMemoryAuditLogRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuditLogRepository {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(AuditTable {
                next_id: 1,
                entries: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, AuditTable>, DbError> {
        self.table.lock().map_err(|_| DbError::LockPoisoned("audit"))
    }

    /// Number of appended entries.
    pub fn len(&self) -> usize {
        self.lock().map(|t| t.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn matches(entry: &AuditEntry, filter: &AuditLogFilter) -> bool {
    if filter.failures_only && entry.success {
        return false;
    }
    if filter
        .user_id
        .as_ref()
        .is_some_and(|user_id| &entry.user_id != user_id)
    {
        return false;
    }
    if filter.entity_id.is_some() && entry.entity_id != filter.entity_id {
        return false;
    }
    if filter.from.is_some_and(|from| entry.timestamp < from) {
        return false;
    }
    if filter.to.is_some_and(|to| entry.timestamp > to) {
        return false;
    }
    true
}

impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append(&self, input: CreateAuditEntry) -> MedgateResult<AuditEntry> {
        let mut table = self.lock()?;
        let id = table.next_id;
        table.next_id += 1;

        let prev_hash = table
            .entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_default();

        let mut entry = AuditEntry {
            id,
            user_id: input.user_id,
            action: input.action,
            entity_type: input.entity_type,
            entity_id: input.entity_id,
            http_method: input.http_method,
            endpoint: input.endpoint,
            ip_address: input.ip_address,
            status_code: input.status_code,
            timestamp: Utc::now(),
            success: input.success,
            old_values: input.old_values,
            new_values: input.new_values,
            details: input.details,
            prev_hash,
            hash: String::new(),
        };
        entry.hash = chain::entry_hash(&entry);

        table.entries.push(entry.clone());
        Ok(entry)
    }

    async fn list(&self, filter: AuditLogFilter) -> MedgateResult<Vec<AuditEntry>> {
        let table = self.lock()?;
        Ok(table
            .entries
            .iter()
            .rev()
            .filter(|e| matches(e, &filter))
            .cloned()
            .collect())
    }
}
