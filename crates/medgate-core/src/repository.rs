//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations own their
//! concurrency story: id assignment must be atomic and monotonic, and
//! readers must never observe a partially written record.

use chrono::{DateTime, Utc};

use crate::error::MedgateResult;
use crate::models::{
    audit::{AuditEntry, CreateAuditEntry},
    consent::{ConsentRecord, CreateConsent},
    record::{ProtectedRecord, RecordFilter},
};

// ---------------------------------------------------------------------------
// Consent
// ---------------------------------------------------------------------------

pub trait ConsentRepository: Send + Sync {
    /// Store a new consent, assigning the next id and `granted_at = now`.
    fn create(
        &self,
        input: CreateConsent,
    ) -> impl Future<Output = MedgateResult<ConsentRecord>> + Send;
    fn get_by_id(&self, id: u64) -> impl Future<Output = MedgateResult<ConsentRecord>> + Send;
    /// Every consent for the patient, active or not, in insertion order.
    fn list_by_patient(
        &self,
        patient_id: i64,
    ) -> impl Future<Output = MedgateResult<Vec<ConsentRecord>>> + Send;
    /// Set `revoked_at` if it is still unset. Returns `None` when no
    /// consent has this id; an already-revoked record is returned
    /// unchanged.
    fn revoke(
        &self,
        id: u64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = MedgateResult<Option<ConsentRecord>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit entries. All set fields must match.
#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub user_id: Option<String>,
    pub entity_id: Option<i64>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    pub failures_only: bool,
}

pub trait AuditLogRepository: Send + Sync {
    /// Append a new entry. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditEntry,
    ) -> impl Future<Output = MedgateResult<AuditEntry>> + Send;
    /// Matching entries, newest first.
    fn list(
        &self,
        filter: AuditLogFilter,
    ) -> impl Future<Output = MedgateResult<Vec<AuditEntry>>> + Send;
}

// ---------------------------------------------------------------------------
// Protected records (storage collaborator)
// ---------------------------------------------------------------------------

pub trait RecordStore: Send + Sync {
    fn get(
        &self,
        entity_type: &str,
        id: i64,
    ) -> impl Future<Output = MedgateResult<Option<ProtectedRecord>>> + Send;
    /// Insert or replace. A record without an id is assigned the next
    /// one for its entity type.
    fn put(
        &self,
        record: ProtectedRecord,
    ) -> impl Future<Output = MedgateResult<ProtectedRecord>> + Send;
    /// Returns whether a record was removed.
    fn delete(
        &self,
        entity_type: &str,
        id: i64,
    ) -> impl Future<Output = MedgateResult<bool>> + Send;
    fn query(
        &self,
        entity_type: &str,
        filter: RecordFilter,
    ) -> impl Future<Output = MedgateResult<Vec<ProtectedRecord>>> + Send;
}
