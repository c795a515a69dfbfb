//! In-memory implementation of [`ConsentRepository`].

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use medgate_core::error::MedgateResult;
use medgate_core::models::consent::{ConsentRecord, CreateConsent};
use medgate_core::repository::ConsentRepository;

use crate::error::DbError;

#[derive(Debug)]
struct ConsentTable {
    next_id: u64,
    rows: Vec<ConsentRecord>,
}

/// Consent store. Records are never deleted; the only mutation is the
/// one-way revocation timestamp.
#[derive(Debug, Clone)]
pub struct InMemoryConsentRepository {
    table: Arc<Mutex<ConsentTable>>,
}

impl Default for InMemoryConsentRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConsentRepository {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(ConsentTable {
                next_id: 1,
                rows: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ConsentTable>, DbError> {
        self.table
            .lock()
            .map_err(|_| DbError::LockPoisoned("consent"))
    }
}

impl ConsentRepository for InMemoryConsentRepository {
    async fn create(&self, input: CreateConsent) -> MedgateResult<ConsentRecord> {
        let mut table = self.lock()?;
        let id = table.next_id;
        table.next_id += 1;

        let record = ConsentRecord {
            id,
            patient_id: input.patient_id,
            consent_type: input.consent_type,
            description: input.description,
            lawful_basis: input.lawful_basis.unwrap_or_default(),
            granted_at: Utc::now(),
            revoked_at: None,
            expires_at: input.expires_at,
            consent_version: input.consent_version.unwrap_or(1),
            consent_text: input.consent_text,
            obtained_by: input.obtained_by,
            ip_address: input.ip_address,
        };
        table.rows.push(record.clone());
        Ok(record)
    }

    async fn get_by_id(&self, id: u64) -> MedgateResult<ConsentRecord> {
        let table = self.lock()?;
        table
            .rows
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| {
                DbError::NotFound {
                    entity: "consent".into(),
                    id: id.to_string(),
                }
                .into()
            })
    }

    async fn list_by_patient(&self, patient_id: i64) -> MedgateResult<Vec<ConsentRecord>> {
        let table = self.lock()?;
        Ok(table
            .rows
            .iter()
            .filter(|c| c.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn revoke(&self, id: u64, at: DateTime<Utc>) -> MedgateResult<Option<ConsentRecord>> {
        let mut table = self.lock()?;
        let Some(record) = table.rows.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if record.revoked_at.is_none() {
            record.revoked_at = Some(at);
        }
        Ok(Some(record.clone()))
    }
}
