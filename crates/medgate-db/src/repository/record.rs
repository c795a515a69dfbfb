//! In-memory implementation of [`RecordStore`].

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use medgate_core::error::MedgateResult;
use medgate_core::models::record::{ProtectedRecord, RecordFilter};
use medgate_core::repository::RecordStore;
use tracing::debug;

use crate::error::DbError;

#[derive(Debug, Default)]
struct EntityTable {
    next_id: i64,
    rows: BTreeMap<i64, ProtectedRecord>,
}

/// Protected-record store keyed by entity type then id.
///
/// Holds whatever it is given; encryption of sensitive fields happens
/// before records reach it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    tables: Arc<Mutex<HashMap<String, EntityTable>>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, EntityTable>>, DbError> {
        self.tables
            .lock()
            .map_err(|_| DbError::LockPoisoned("records"))
    }

    /// Count of `put` and successful `delete` calls since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

impl RecordStore for InMemoryRecordStore {
    async fn get(&self, entity_type: &str, id: i64) -> MedgateResult<Option<ProtectedRecord>> {
        let tables = self.lock()?;
        Ok(tables
            .get(entity_type)
            .and_then(|t| t.rows.get(&id))
            .cloned())
    }

    async fn put(&self, mut record: ProtectedRecord) -> MedgateResult<ProtectedRecord> {
        if record.entity_type.is_empty() {
            return Err(DbError::InvalidRecord("entity type is required".into()).into());
        }

        let mut tables = self.lock()?;
        let table = tables.entry(record.entity_type.clone()).or_default();

        let id = match record.id {
            Some(id) => {
                table.next_id = table.next_id.max(id);
                id
            }
            None => {
                table.next_id += 1;
                table.next_id
            }
        };
        record.id = Some(id);
        if record.entity_type == "Patient" && record.patient_id.is_none() {
            record.patient_id = Some(id);
        }

        table.rows.insert(id, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(entity_type = %record.entity_type, id, "Record stored");
        Ok(record)
    }

    async fn delete(&self, entity_type: &str, id: i64) -> MedgateResult<bool> {
        let mut tables = self.lock()?;
        let removed = tables
            .get_mut(entity_type)
            .and_then(|t| t.rows.remove(&id))
            .is_some();
        if removed {
            self.writes.fetch_add(1, Ordering::SeqCst);
            debug!(entity_type, id, "Record deleted");
        }
        Ok(removed)
    }

    async fn query(
        &self,
        entity_type: &str,
        filter: RecordFilter,
    ) -> MedgateResult<Vec<ProtectedRecord>> {
        let tables = self.lock()?;
        let Some(table) = tables.get(entity_type) else {
            return Ok(Vec::new());
        };
        Ok(table
            .rows
            .values()
            .filter(|r| filter.patient_id.is_none() || r.patient_id == filter.patient_id)
            .cloned()
            .collect())
    }
}
