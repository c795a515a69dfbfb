//! Consent registry. Answers whether processing a patient's data for a
//! given purpose is currently lawful.

use chrono::Utc;
use medgate_core::error::{MedgateError, MedgateResult};
use medgate_core::models::consent::{ConsentRecord, CreateConsent, LawfulBasis};
use medgate_core::repository::ConsentRepository;
use tracing::{info, warn};

/// Consent service.
///
/// Generic over the repository implementation so that the access layer
/// has no dependency on the storage crate.
pub struct ConsentRegistry<C: ConsentRepository> {
    repo: C,
}

/// Newest grant first; ids break ties between grants in the same instant.
fn newest_first(a: &ConsentRecord, b: &ConsentRecord) -> std::cmp::Ordering {
    b.granted_at.cmp(&a.granted_at).then(b.id.cmp(&a.id))
}

impl<C: ConsentRepository> ConsentRegistry<C> {
    pub fn new(repo: C) -> Self {
        Self { repo }
    }

    /// Active consents of a patient, most recently granted first.
    pub async fn active_consents(&self, patient_id: i64) -> MedgateResult<Vec<ConsentRecord>> {
        let now = Utc::now();
        let mut consents: Vec<_> = self
            .repo
            .list_by_patient(patient_id)
            .await?
            .into_iter()
            .filter(|c| c.is_active_at(now))
            .collect();
        consents.sort_by(newest_first);
        Ok(consents)
    }

    /// Every consent ever recorded for a patient, including revoked and
    /// expired ones, most recently granted first.
    pub async fn consent_history(&self, patient_id: i64) -> MedgateResult<Vec<ConsentRecord>> {
        let mut consents = self.repo.list_by_patient(patient_id).await?;
        consents.sort_by(newest_first);
        Ok(consents)
    }

    pub async fn get_by_id(&self, consent_id: u64) -> MedgateResult<ConsentRecord> {
        self.repo.get_by_id(consent_id).await
    }

    /// Record a new consent. Id and grant time are assigned by the
    /// store; the lawful basis defaults to `Consent`.
    pub async fn create(&self, mut input: CreateConsent) -> MedgateResult<ConsentRecord> {
        if input.patient_id <= 0 {
            return Err(MedgateError::Validation {
                message: "patient id must be positive".into(),
            });
        }
        if input.consent_type.trim().is_empty() {
            return Err(MedgateError::Validation {
                message: "consent type is required".into(),
            });
        }
        input.lawful_basis = Some(input.lawful_basis.unwrap_or_default());
        if input.obtained_by.trim().is_empty() {
            input.obtained_by = "Unknown".into();
        }

        let consent = self.repo.create(input).await?;
        info!(
            consent_id = consent.id,
            patient_id = consent.patient_id,
            consent_type = %consent.consent_type,
            basis = %consent.lawful_basis,
            "Consent granted"
        );
        Ok(consent)
    }

    /// Revoke a consent. Returns whether the consent exists; revoking an
    /// already-revoked consent keeps the original revocation time.
    pub async fn revoke(&self, consent_id: u64) -> MedgateResult<bool> {
        match self.repo.revoke(consent_id, Utc::now()).await? {
            Some(consent) => {
                warn!(
                    consent_id,
                    patient_id = consent.patient_id,
                    consent_type = %consent.consent_type,
                    "Consent revoked"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn has_active_consent(
        &self,
        patient_id: i64,
        consent_type: &str,
    ) -> MedgateResult<bool> {
        let found = self
            .active_consents(patient_id)
            .await?
            .iter()
            .any(|c| c.consent_type == consent_type);
        if !found {
            warn!(patient_id, consent_type, "No active consent found");
        }
        Ok(found)
    }

    /// Lawful basis of the most recently granted active consent for the
    /// patient and purpose.
    pub async fn lawful_basis(
        &self,
        patient_id: i64,
        consent_type: &str,
    ) -> MedgateResult<Option<LawfulBasis>> {
        Ok(self
            .active_consents(patient_id)
            .await?
            .into_iter()
            .find(|c| c.consent_type == consent_type)
            .map(|c| c.lawful_basis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use medgate_db::repository::InMemoryConsentRepository;

    fn registry() -> ConsentRegistry<InMemoryConsentRepository> {
        ConsentRegistry::new(InMemoryConsentRepository::new())
    }

    fn grant(patient_id: i64, consent_type: &str) -> CreateConsent {
        CreateConsent {
            patient_id,
            consent_type: consent_type.into(),
            consent_text: "I consent.".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_validates_input() {
        let registry = registry();

        let err = registry.create(grant(0, "Treatment")).await.unwrap_err();
        assert!(matches!(err, MedgateError::Validation { .. }));

        let err = registry.create(grant(-3, "Treatment")).await.unwrap_err();
        assert!(matches!(err, MedgateError::Validation { .. }));

        let err = registry.create(grant(1, "  ")).await.unwrap_err();
        assert!(matches!(err, MedgateError::Validation { .. }));
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let registry = registry();
        let consent = registry.create(grant(1, "Treatment")).await.unwrap();
        assert_eq!(consent.id, 1);
        assert_eq!(consent.lawful_basis, LawfulBasis::Consent);
        assert_eq!(consent.obtained_by, "Unknown");
    }

    #[tokio::test]
    async fn revocation_ends_activity_unless_another_grant_exists() {
        let registry = registry();
        let first = registry.create(grant(2, "Treatment")).await.unwrap();
        assert!(registry.has_active_consent(2, "Treatment").await.unwrap());

        assert!(registry.revoke(first.id).await.unwrap());
        assert!(!registry.has_active_consent(2, "Treatment").await.unwrap());

        registry.create(grant(2, "Treatment")).await.unwrap();
        assert!(registry.has_active_consent(2, "Treatment").await.unwrap());
        assert!(!registry.has_active_consent(2, "Research").await.unwrap());
    }

    #[tokio::test]
    async fn revoke_twice_keeps_first_time() {
        let registry = registry();
        let consent = registry.create(grant(1, "Treatment")).await.unwrap();

        assert!(registry.revoke(consent.id).await.unwrap());
        let first = registry.get_by_id(consent.id).await.unwrap().revoked_at;
        assert!(registry.revoke(consent.id).await.unwrap());
        let second = registry.get_by_id(consent.id).await.unwrap().revoked_at;

        assert!(first.is_some());
        assert_eq!(first, second);
        assert!(!registry.revoke(404).await.unwrap());
    }

    #[tokio::test]
    async fn expired_consent_is_inactive() {
        let registry = registry();
        registry
            .create(CreateConsent {
                expires_at: Some(Utc::now() - Duration::minutes(1)),
                ..grant(3, "Treatment")
            })
            .await
            .unwrap();
        assert!(!registry.has_active_consent(3, "Treatment").await.unwrap());
        assert!(registry.active_consents(3).await.unwrap().is_empty());
        assert_eq!(registry.consent_history(3).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lawful_basis_uses_latest_active_grant() {
        let registry = registry();
        registry
            .create(CreateConsent {
                lawful_basis: Some(LawfulBasis::Contract),
                ..grant(4, "Treatment")
            })
            .await
            .unwrap();
        let latest = registry
            .create(CreateConsent {
                lawful_basis: Some(LawfulBasis::VitalInterest),
                ..grant(4, "Treatment")
            })
            .await
            .unwrap();

        assert_eq!(
            registry.lawful_basis(4, "Treatment").await.unwrap(),
            Some(LawfulBasis::VitalInterest)
        );

        registry.revoke(latest.id).await.unwrap();
        assert_eq!(
            registry.lawful_basis(4, "Treatment").await.unwrap(),
            Some(LawfulBasis::Contract)
        );
        assert_eq!(registry.lawful_basis(4, "Research").await.unwrap(), None);
    }

    #[tokio::test]
    async fn active_consents_are_newest_first() {
        let registry = registry();
        for consent_type in ["Treatment", "Research", "DataProcessing"] {
            registry.create(grant(5, consent_type)).await.unwrap();
        }
        let ids: Vec<_> = registry
            .active_consents(5)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, [3, 2, 1]);
    }
}
