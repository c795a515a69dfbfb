//! Audit recorder: the last step of every mediation path.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use medgate_core::chain;
use medgate_core::error::{MedgateError, MedgateResult};
use medgate_core::models::audit::{AuditEntry, CreateAuditEntry};
use medgate_core::repository::{AuditLogFilter, AuditLogRepository};
use tracing::{error, info, warn};

/// Append-only audit trail over a pluggable [`AuditLogRepository`].
pub struct AuditRecorder<A: AuditLogRepository + 'static> {
    repo: Arc<A>,
}

impl<A: AuditLogRepository + 'static> Clone for AuditRecorder<A> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<A: AuditLogRepository + 'static> AuditRecorder<A> {
    pub fn new(repo: A) -> Self {
        Self {
            repo: Arc::new(repo),
        }
    }

    /// Append an entry and return it as stored.
    ///
    /// Never fails the caller. The write runs on its own task, so it
    /// completes even if the calling request is cancelled mid-await. A
    /// store failure is escalated to the operational log and yields
    /// `None`.
    pub async fn record(&self, entry: CreateAuditEntry) -> Option<AuditEntry> {
        let repo = Arc::clone(&self.repo);
        let summary = format!(
            "[{}] User={} Entity={}/{} Endpoint={} Status={} IP={}",
            entry.action,
            entry.user_id,
            entry.entity_type,
            entry
                .entity_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            entry.endpoint,
            entry.status_code,
            entry.ip_address,
        );

        let handle = tokio::spawn(async move { repo.append(entry).await });
        let result = match handle.await {
            Ok(result) => result,
            Err(join) => Err(MedgateError::Internal(format!("audit task aborted: {join}"))),
        };

        match result {
            Ok(stored) => {
                if stored.success {
                    info!(audit_id = stored.id, "AUDIT: {summary}");
                } else {
                    warn!(audit_id = stored.id, "AUDIT: {summary} - FAILED");
                }
                Some(stored)
            }
            Err(e) => {
                let failure = MedgateError::AuditWrite(e.to_string());
                error!(error = %failure, "AUDIT WRITE FAILURE: {summary}");
                None
            }
        }
    }

    /// Entries about one entity, newest first.
    pub async fn by_entity(&self, entity_id: i64) -> MedgateResult<Vec<AuditEntry>> {
        self.repo
            .list(AuditLogFilter {
                entity_id: Some(entity_id),
                ..Default::default()
            })
            .await
    }

    /// Entries made by one user, newest first.
    pub async fn by_user(&self, user_id: &str) -> MedgateResult<Vec<AuditEntry>> {
        self.repo
            .list(AuditLogFilter {
                user_id: Some(user_id.to_string()),
                ..Default::default()
            })
            .await
    }

    /// Entries with `start <= timestamp <= end`, newest first.
    pub async fn by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MedgateResult<Vec<AuditEntry>> {
        self.repo
            .list(AuditLogFilter {
                from: Some(start),
                to: Some(end),
                ..Default::default()
            })
            .await
    }

    /// Failed attempts only, newest first.
    pub async fn failures(&self) -> MedgateResult<Vec<AuditEntry>> {
        self.repo
            .list(AuditLogFilter {
                failures_only: true,
                ..Default::default()
            })
            .await
    }

    /// Every entry, newest first.
    pub async fn all(&self) -> MedgateResult<Vec<AuditEntry>> {
        self.repo.list(AuditLogFilter::default()).await
    }

    /// Re-walk the hash chain over the whole log.
    pub async fn verify_integrity(&self) -> MedgateResult<()> {
        let mut entries = self.all().await?;
        entries.reverse();
        chain::verify_chain(&entries).map_err(|brk| {
            error!(entry_id = brk.entry_id, reason = brk.reason, "Audit chain broken");
            MedgateError::Internal(brk.to_string())
        })
    }
}
