//! Access mediator: authorization, consent, field encryption and audit
//! around every operation on protected data.
//!
//! Each call walks
//! `Authorizing -> ConsentChecking -> Processing -> Completed`, stopping
//! at the first failing step, and appends exactly one audit entry for
//! whichever terminal state it reached.

use std::collections::BTreeMap;
use std::fmt;

use medgate_core::error::{MedgateError, MedgateResult};
use medgate_core::models::audit::{AuditAction, AuditEntry, CreateAuditEntry};
use medgate_core::models::consent::{ConsentRecord, CreateConsent};
use medgate_core::models::identity::Identity;
use medgate_core::models::record::{ProtectedRecord, RecordFilter};
use medgate_core::models::schema::SensitiveFieldSchema;
use medgate_core::repository::{AuditLogRepository, ConsentRepository, RecordStore};
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::authorizer::{AccessAction, AuthzDecision, DenyReason, RoleAuthorizer};
use crate::config::AccessConfig;
use crate::consent::ConsentRegistry;
use crate::crypto::FieldEncryptionEngine;
use crate::error::AccessError;

/// Entity type under which consent operations are audited.
pub const CONSENT_ENTITY: &str = "PatientConsent";

/// Terminal state of a mediated call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediationState {
    /// Role check failed.
    Denied,
    /// Required consent missing.
    ConsentDenied,
    /// Encryption or decryption failed.
    CryptoFailed,
    /// Rejected by validation or by the store (not found, unavailable).
    Rejected,
    Completed,
}

impl MediationState {
    fn from_error(err: &MedgateError) -> Self {
        match err {
            MedgateError::AuthenticationFailed { .. } | MedgateError::AuthorizationDenied { .. } => {
                MediationState::Denied
            }
            MedgateError::ConsentMissing { .. } => MediationState::ConsentDenied,
            MedgateError::Encryption(_) | MedgateError::Decryption => MediationState::CryptoFailed,
            _ => MediationState::Rejected,
        }
    }
}

impl fmt::Display for MediationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One operation on a protected entity.
#[derive(Debug, Clone)]
pub struct MediationRequest {
    pub action: AccessAction,
    pub entity_type: String,
    pub entity_id: Option<i64>,
    /// Patient who owns the resource, as asserted by the route.
    pub patient_id: Option<i64>,
    pub http_method: String,
    pub endpoint: String,
    /// Plaintext record for create and update.
    pub payload: Option<ProtectedRecord>,
}

impl MediationRequest {
    fn new(action: AccessAction, entity_type: impl Into<String>, entity_id: Option<i64>) -> Self {
        let entity_type = entity_type.into();
        let (http_method, endpoint) = default_route(action, &entity_type, entity_id);
        Self {
            action,
            entity_type,
            entity_id,
            patient_id: None,
            http_method,
            endpoint,
            payload: None,
        }
    }

    pub fn read(entity_type: impl Into<String>, id: i64) -> Self {
        Self::new(AccessAction::Read, entity_type, Some(id))
    }

    pub fn search(entity_type: impl Into<String>) -> Self {
        Self::new(AccessAction::Search, entity_type, None)
    }

    pub fn export(entity_type: impl Into<String>) -> Self {
        Self::new(AccessAction::Export, entity_type, None)
    }

    pub fn create(record: ProtectedRecord) -> Self {
        let mut request = Self::new(AccessAction::Create, record.entity_type.clone(), None);
        request.patient_id = record.patient_id;
        request.payload = Some(record);
        request
    }

    pub fn update(id: i64, record: ProtectedRecord) -> Self {
        let mut request = Self::new(AccessAction::Update, record.entity_type.clone(), Some(id));
        request.patient_id = record.patient_id;
        request.payload = Some(record);
        request
    }

    pub fn delete(entity_type: impl Into<String>, id: i64) -> Self {
        Self::new(AccessAction::Delete, entity_type, Some(id))
    }

    /// Assert the owning patient. Required for patient self-service
    /// reads; narrows searches to one patient.
    pub fn owned_by(mut self, patient_id: i64) -> Self {
        self.patient_id = Some(patient_id);
        self
    }

    /// Override the method and endpoint recorded in the audit trail.
    pub fn at(mut self, http_method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.http_method = http_method.into();
        self.endpoint = endpoint.into();
        self
    }
}

fn default_route(action: AccessAction, entity_type: &str, id: Option<i64>) -> (String, String) {
    let base = format!("/api/{entity_type}");
    let with_id = match id {
        Some(id) => format!("{base}/{id}"),
        None => base.clone(),
    };
    let (method, endpoint) = match action {
        AccessAction::Read => ("GET", with_id),
        AccessAction::Search => ("GET", format!("{base}/search")),
        AccessAction::Export => ("GET", format!("{base}/export")),
        AccessAction::Create | AccessAction::GrantConsent => ("POST", base),
        AccessAction::Update => ("PUT", with_id),
        AccessAction::Delete => ("DELETE", with_id),
        AccessAction::RevokeConsent => ("POST", format!("{with_id}/revoke")),
    };
    (method.to_string(), endpoint)
}

/// Successful mediation result. Records are plaintext.
#[derive(Debug, Clone)]
pub struct MediationResponse {
    pub status_code: u16,
    pub records: Vec<ProtectedRecord>,
    /// Id of the audit entry, `None` if the audit store was unavailable.
    pub audit_id: Option<u64>,
}

/// What a call touched, for the audit entry.
#[derive(Debug, Default)]
struct Trace {
    entity_id: Option<i64>,
    old_values: Option<String>,
    new_values: Option<String>,
}

/// Describes one audited attempt independent of its outcome.
struct Attempt<'a> {
    action: AuditAction,
    entity_type: &'a str,
    http_method: &'a str,
    endpoint: &'a str,
}

/// The only entry point domain services use to touch protected data.
///
/// Generic over repository implementations so that the access layer
/// has no dependency on the database crate.
pub struct AccessMediator<C, A, S>
where
    C: ConsentRepository,
    A: AuditLogRepository + 'static,
    S: RecordStore,
{
    authorizer: RoleAuthorizer,
    consents: ConsentRegistry<C>,
    audit: AuditRecorder<A>,
    engine: FieldEncryptionEngine,
    schema: SensitiveFieldSchema,
    consent_requirements: BTreeMap<String, String>,
    store: S,
}

impl<C, A, S> AccessMediator<C, A, S>
where
    C: ConsentRepository,
    A: AuditLogRepository + 'static,
    S: RecordStore,
{
    /// Build the mediator. Fails if the configured key is not exactly
    /// 32 bytes or the schema names an unsupported algorithm; callers
    /// treat either as fatal at startup.
    pub fn new(
        config: &AccessConfig,
        consent_repo: C,
        audit_repo: A,
        store: S,
    ) -> Result<Self, AccessError> {
        let engine = FieldEncryptionEngine::new(&config.encryption_key)?;
        config
            .sensitive_fields
            .validate()
            .map_err(|e| AccessError::Config(e.to_string()))?;
        Ok(Self {
            authorizer: RoleAuthorizer::new(),
            consents: ConsentRegistry::new(consent_repo),
            audit: AuditRecorder::new(audit_repo),
            engine,
            schema: config.sensitive_fields.clone(),
            consent_requirements: config.consent_requirements.clone(),
            store,
        })
    }

    /// Consent queries for reporting endpoints.
    pub fn consents(&self) -> &ConsentRegistry<C> {
        &self.consents
    }

    /// Audit queries for reporting endpoints.
    pub fn audit(&self) -> &AuditRecorder<A> {
        &self.audit
    }

    pub fn schema(&self) -> &SensitiveFieldSchema {
        &self.schema
    }

    /// Authorize and perform one operation on a protected entity.
    pub async fn mediate(
        &self,
        identity: &Identity,
        request: MediationRequest,
    ) -> MedgateResult<MediationResponse> {
        let span = info_span!(
            "mediate",
            request_id = %Uuid::new_v4(),
            action = %request.action,
            entity_type = %request.entity_type,
            user = %identity.audit_user(),
        );

        async move {
            let mut trace = Trace {
                entity_id: request.entity_id,
                ..Default::default()
            };
            let outcome = self.process(identity, &request, &mut trace).await;

            let attempt = Attempt {
                action: request.action.audit_action(),
                entity_type: &request.entity_type,
                http_method: &request.http_method,
                endpoint: &request.endpoint,
            };
            let status = outcome.as_ref().map(|(status, _)| *status);
            let stored = self.finish(identity, attempt, trace, status).await;

            outcome.map(|(status_code, records)| MediationResponse {
                status_code,
                records,
                audit_id: stored.map(|e| e.id),
            })
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        identity: &Identity,
        request: &MediationRequest,
        trace: &mut Trace,
    ) -> MedgateResult<(u16, Vec<ProtectedRecord>)> {
        // Authorizing
        self.check_role(identity, request.action, request.patient_id, &request.entity_type)?;

        if matches!(
            request.action,
            AccessAction::GrantConsent | AccessAction::RevokeConsent
        ) {
            return Err(consent_via_mediate());
        }

        // ConsentChecking. Updates check against the stored owner, which
        // `update` loads first.
        if request.action == AccessAction::Create {
            self.check_consent(&request.entity_type, Self::asserted_owner(request))
                .await?;
        }

        // Processing
        match request.action {
            AccessAction::Read => self.read(request, trace).await,
            AccessAction::Search => {
                let filter = RecordFilter {
                    patient_id: request.patient_id,
                };
                self.fetch_many(&request.entity_type, filter).await
            }
            AccessAction::Export => {
                self.fetch_many(&request.entity_type, RecordFilter::default())
                    .await
            }
            AccessAction::Create => self.create(request, trace).await,
            AccessAction::Update => self.update(request, trace).await,
            AccessAction::Delete => self.delete(request, trace).await,
            AccessAction::GrantConsent | AccessAction::RevokeConsent => Err(consent_via_mediate()),
        }
    }

    fn check_role(
        &self,
        identity: &Identity,
        action: AccessAction,
        owner: Option<i64>,
        entity_type: &str,
    ) -> MedgateResult<()> {
        match self.authorizer.authorize(identity, action, owner) {
            AuthzDecision::Allow => Ok(()),
            AuthzDecision::Deny(DenyReason::Unauthenticated) => {
                Err(MedgateError::AuthenticationFailed {
                    reason: "no authenticated identity".into(),
                })
            }
            AuthzDecision::Deny(DenyReason::Forbidden) => Err(MedgateError::AuthorizationDenied {
                reason: format!(
                    "roles [{}] may not {action} {entity_type}",
                    identity.role_summary()
                ),
            }),
        }
    }

    /// Owner named by the caller, from the payload or the route.
    fn asserted_owner(request: &MediationRequest) -> Option<i64> {
        request
            .payload
            .as_ref()
            .and_then(|p| p.patient_id)
            .or(request.patient_id)
    }

    async fn check_consent(&self, entity_type: &str, patient_id: Option<i64>) -> MedgateResult<()> {
        let Some(consent_type) = self.consent_requirements.get(entity_type) else {
            return Ok(());
        };
        let patient_id = patient_id.ok_or_else(|| MedgateError::Validation {
            message: format!("{entity_type} requires a patient id"),
        })?;

        if self
            .consents
            .has_active_consent(patient_id, consent_type)
            .await?
        {
            Ok(())
        } else {
            Err(MedgateError::ConsentMissing {
                patient_id,
                consent_type: consent_type.clone(),
            })
        }
    }

    fn require_id(request: &MediationRequest) -> MedgateResult<i64> {
        request.entity_id.ok_or_else(|| MedgateError::Validation {
            message: format!("{} of {} requires an id", request.action, request.entity_type),
        })
    }

    fn require_payload(request: &MediationRequest) -> MedgateResult<ProtectedRecord> {
        request
            .payload
            .clone()
            .ok_or_else(|| MedgateError::Validation {
                message: format!("{} of {} requires a payload", request.action, request.entity_type),
            })
    }

    async fn fetch_existing(&self, entity_type: &str, id: i64) -> MedgateResult<ProtectedRecord> {
        self.store
            .get(entity_type, id)
            .await?
            .ok_or_else(|| not_found(entity_type, id))
    }

    async fn read(
        &self,
        request: &MediationRequest,
        trace: &mut Trace,
    ) -> MedgateResult<(u16, Vec<ProtectedRecord>)> {
        let id = Self::require_id(request)?;
        let stored = self.fetch_existing(&request.entity_type, id).await?;
        trace.entity_id = stored.id;

        // A record owned by someone other than the asserted owner looks
        // exactly like a missing one.
        if request.patient_id.is_some() && stored.patient_id != request.patient_id {
            debug!(id, "Asserted owner does not match stored owner");
            return Err(not_found(&request.entity_type, id));
        }

        let plain = self.engine.decrypt_fields(&self.schema, stored)?;
        Ok((200, vec![plain]))
    }

    async fn fetch_many(
        &self,
        entity_type: &str,
        filter: RecordFilter,
    ) -> MedgateResult<(u16, Vec<ProtectedRecord>)> {
        let stored = self.store.query(entity_type, filter).await?;
        let plain = stored
            .into_iter()
            .map(|r| self.engine.decrypt_fields(&self.schema, r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((200, plain))
    }

    async fn create(
        &self,
        request: &MediationRequest,
        trace: &mut Trace,
    ) -> MedgateResult<(u16, Vec<ProtectedRecord>)> {
        let mut record = Self::require_payload(request)?;
        record.entity_type = request.entity_type.clone();
        record.id = None;
        record.patient_id = record.patient_id.or(request.patient_id);

        let encrypted = self.engine.encrypt_fields(&self.schema, record.clone())?;
        let stored = self.store.put(encrypted).await?;
        trace.entity_id = stored.id;
        trace.new_values = Some(stored.snapshot());

        record.id = stored.id;
        record.patient_id = stored.patient_id;
        Ok((201, vec![record]))
    }

    async fn update(
        &self,
        request: &MediationRequest,
        trace: &mut Trace,
    ) -> MedgateResult<(u16, Vec<ProtectedRecord>)> {
        let id = Self::require_id(request)?;
        let mut record = Self::require_payload(request)?;
        let existing = self.fetch_existing(&request.entity_type, id).await?;

        // Ownership is fixed at creation; an update may restate it but
        // never move the record to another patient.
        let owner = match (existing.patient_id, Self::asserted_owner(request)) {
            (Some(stored), Some(asserted)) if stored != asserted => {
                return Err(MedgateError::Validation {
                    message: format!(
                        "patient id {asserted} does not match the owner of {} {id}",
                        request.entity_type
                    ),
                });
            }
            (stored, asserted) => stored.or(asserted),
        };
        self.check_consent(&request.entity_type, owner).await?;
        trace.old_values = Some(existing.snapshot());

        record.entity_type = request.entity_type.clone();
        record.id = Some(id);
        record.patient_id = owner;

        let encrypted = self.engine.encrypt_fields(&self.schema, record.clone())?;
        let stored = self.store.put(encrypted).await?;
        trace.new_values = Some(stored.snapshot());
        Ok((200, vec![record]))
    }

    async fn delete(
        &self,
        request: &MediationRequest,
        trace: &mut Trace,
    ) -> MedgateResult<(u16, Vec<ProtectedRecord>)> {
        let id = Self::require_id(request)?;
        let existing = self.fetch_existing(&request.entity_type, id).await?;
        trace.old_values = Some(existing.snapshot());

        if !self.store.delete(&request.entity_type, id).await? {
            return Err(not_found(&request.entity_type, id));
        }
        Ok((204, Vec::new()))
    }

    /// Record a consent on behalf of `identity`. Patients may only grant
    /// consent for themselves.
    pub async fn grant_consent(
        &self,
        identity: &Identity,
        input: CreateConsent,
    ) -> MedgateResult<ConsentRecord> {
        let mut trace = Trace::default();
        let outcome = self.grant(identity, input, &mut trace).await;

        let endpoint = format!("/api/{CONSENT_ENTITY}");
        let attempt = Attempt {
            action: AccessAction::GrantConsent.audit_action(),
            entity_type: CONSENT_ENTITY,
            http_method: "POST",
            endpoint: &endpoint,
        };
        let status = outcome.as_ref().map(|_| 201);
        self.finish(identity, attempt, trace, status).await;
        outcome
    }

    async fn grant(
        &self,
        identity: &Identity,
        mut input: CreateConsent,
        trace: &mut Trace,
    ) -> MedgateResult<ConsentRecord> {
        self.check_role(
            identity,
            AccessAction::GrantConsent,
            Some(input.patient_id),
            CONSENT_ENTITY,
        )?;
        if input.obtained_by.trim().is_empty() {
            input.obtained_by = identity.user_id.clone();
        }
        if input.ip_address.trim().is_empty() {
            input.ip_address = identity.source_address.clone();
        }

        let consent = self.consents.create(input).await?;
        trace.entity_id = i64::try_from(consent.id).ok();
        trace.new_values = serde_json::to_string(&consent).ok();
        Ok(consent)
    }

    /// Revoke a consent on behalf of `identity`. Patients may only revoke
    /// their own consents; an unknown id looks the same to them as
    /// someone else's consent.
    pub async fn revoke_consent(&self, identity: &Identity, consent_id: u64) -> MedgateResult<()> {
        let mut trace = Trace {
            entity_id: i64::try_from(consent_id).ok(),
            ..Default::default()
        };
        let outcome = self.revoke(identity, consent_id, &mut trace).await;

        let endpoint = format!("/api/{CONSENT_ENTITY}/{consent_id}/revoke");
        let attempt = Attempt {
            action: AccessAction::RevokeConsent.audit_action(),
            entity_type: CONSENT_ENTITY,
            http_method: "POST",
            endpoint: &endpoint,
        };
        let status = outcome.as_ref().map(|_| 204);
        self.finish(identity, attempt, trace, status).await;
        outcome
    }

    async fn revoke(
        &self,
        identity: &Identity,
        consent_id: u64,
        trace: &mut Trace,
    ) -> MedgateResult<()> {
        let existing = match self.consents.get_by_id(consent_id).await {
            Ok(consent) => Some(consent),
            Err(MedgateError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };
        let owner = existing.as_ref().map(|c| c.patient_id);
        self.check_role(identity, AccessAction::RevokeConsent, owner, CONSENT_ENTITY)?;

        // Only admins get past the role check without an owner.
        let Some(existing) = existing else {
            return Err(MedgateError::NotFound {
                entity: CONSENT_ENTITY.into(),
                id: consent_id.to_string(),
            });
        };
        trace.old_values = serde_json::to_string(&existing).ok();

        self.consents.revoke(consent_id).await?;
        let revoked = self.consents.get_by_id(consent_id).await?;
        trace.new_values = serde_json::to_string(&revoked).ok();
        Ok(())
    }

    /// Append the single audit entry for an attempt.
    async fn finish(
        &self,
        identity: &Identity,
        attempt: Attempt<'_>,
        trace: Trace,
        status: Result<u16, &MedgateError>,
    ) -> Option<AuditEntry> {
        let (status_code, state, reason) = match status {
            Ok(code) => (code, MediationState::Completed, None),
            Err(err) => (err.status_code(), MediationState::from_error(err), Some(err.to_string())),
        };

        match status_code {
            401 => warn!(
                ip = %identity.source_address,
                endpoint = attempt.endpoint,
                "SECURITY: Unauthorized access attempt"
            ),
            403 => warn!(
                user = %identity.audit_user(),
                ip = %identity.source_address,
                endpoint = attempt.endpoint,
                "SECURITY: Forbidden access attempt"
            ),
            _ => {}
        }

        let mut details = format!("Role: {}; State: {state}", identity.role_summary());
        if let Some(reason) = reason {
            details.push_str("; ");
            details.push_str(&reason);
        }

        self.audit
            .record(CreateAuditEntry {
                user_id: identity.audit_user().to_string(),
                action: attempt.action,
                entity_type: attempt.entity_type.to_string(),
                entity_id: trace.entity_id,
                http_method: attempt.http_method.to_string(),
                endpoint: attempt.endpoint.to_string(),
                ip_address: identity.source_address.clone(),
                status_code,
                success: state == MediationState::Completed,
                old_values: trace.old_values,
                new_values: trace.new_values,
                details: Some(details),
            })
            .await
    }
}

fn consent_via_mediate() -> MedgateError {
    MedgateError::Validation {
        message: "consent changes go through grant_consent and revoke_consent".into(),
    }
}

fn not_found(entity_type: &str, id: i64) -> MedgateError {
    MedgateError::NotFound {
        entity: entity_type.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes_follow_rest_conventions() {
        let read = MediationRequest::read("Patient", 3);
        assert_eq!((read.http_method.as_str(), read.endpoint.as_str()), ("GET", "/api/Patient/3"));

        let search = MediationRequest::search("MedicalRecord").owned_by(9);
        assert_eq!(search.endpoint, "/api/MedicalRecord/search");
        assert_eq!(search.patient_id, Some(9));

        let delete = MediationRequest::delete("Prescription", 4);
        assert_eq!(delete.http_method, "DELETE");

        let create = MediationRequest::create(ProtectedRecord::new("MedicalRecord").with_patient(2));
        assert_eq!((create.http_method.as_str(), create.endpoint.as_str()), ("POST", "/api/MedicalRecord"));
        assert_eq!(create.patient_id, Some(2));

        let custom = MediationRequest::export("Patient").at("POST", "/api/reports/patients");
        assert_eq!(custom.endpoint, "/api/reports/patients");
    }

    #[test]
    fn errors_map_to_terminal_states() {
        let denied = MedgateError::AuthorizationDenied { reason: "x".into() };
        let consent = MedgateError::ConsentMissing {
            patient_id: 1,
            consent_type: "Treatment".into(),
        };
        assert_eq!(MediationState::from_error(&denied), MediationState::Denied);
        assert_eq!(MediationState::from_error(&consent), MediationState::ConsentDenied);
        assert_eq!(MediationState::from_error(&MedgateError::Decryption), MediationState::CryptoFailed);
        assert_eq!(
            MediationState::from_error(&MedgateError::Storage("down".into())),
            MediationState::Rejected
        );
    }
}
