//! Patient consent domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Regulatory justification for processing personal data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum LawfulBasis {
    #[default]
    Consent,
    Contract,
    LegalObligation,
    VitalInterest,
    PublicTask,
    LegitimateInterest,
}

impl fmt::Display for LawfulBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LawfulBasis::Consent => "Consent",
            LawfulBasis::Contract => "Contract",
            LawfulBasis::LegalObligation => "LegalObligation",
            LawfulBasis::VitalInterest => "VitalInterest",
            LawfulBasis::PublicTask => "PublicTask",
            LawfulBasis::LegitimateInterest => "LegitimateInterest",
        };
        f.write_str(name)
    }
}

impl FromStr for LawfulBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Consent" => Ok(LawfulBasis::Consent),
            "Contract" => Ok(LawfulBasis::Contract),
            "LegalObligation" => Ok(LawfulBasis::LegalObligation),
            "VitalInterest" => Ok(LawfulBasis::VitalInterest),
            "PublicTask" => Ok(LawfulBasis::PublicTask),
            "LegitimateInterest" => Ok(LawfulBasis::LegitimateInterest),
            other => Err(format!("unknown lawful basis: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsentRecord {
    pub id: u64,
    pub patient_id: i64,
    /// Free-form purpose, e.g. `Treatment`, `Research`.
    pub consent_type: String,
    pub description: String,
    pub lawful_basis: LawfulBasis,
    pub granted_at: DateTime<Utc>,
    /// Terminal once set.
    pub revoked_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Version of the consent form the patient acknowledged.
    pub consent_version: u32,
    pub consent_text: String,
    pub obtained_by: String,
    pub ip_address: String,
}

impl ConsentRecord {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

/// Input for recording a new consent. Id and grant time are always
/// assigned server-side.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateConsent {
    pub patient_id: i64,
    pub consent_type: String,
    pub description: String,
    /// `None` defaults to [`LawfulBasis::Consent`].
    pub lawful_basis: Option<LawfulBasis>,
    pub expires_at: Option<DateTime<Utc>>,
    pub consent_version: Option<u32>,
    pub consent_text: String,
    pub obtained_by: String,
    pub ip_address: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(revoked: Option<DateTime<Utc>>, expires: Option<DateTime<Utc>>) -> ConsentRecord {
        ConsentRecord {
            id: 1,
            patient_id: 1,
            consent_type: "Treatment".into(),
            description: String::new(),
            lawful_basis: LawfulBasis::Consent,
            granted_at: Utc::now(),
            revoked_at: revoked,
            expires_at: expires,
            consent_version: 1,
            consent_text: String::new(),
            obtained_by: "Dr. Smith".into(),
            ip_address: "192.168.1.1".into(),
        }
    }

    #[test]
    fn activity_follows_revocation_and_expiry() {
        let now = Utc::now();
        assert!(record(None, None).is_active_at(now));
        assert!(record(None, Some(now + Duration::days(1))).is_active_at(now));
        assert!(!record(None, Some(now - Duration::seconds(1))).is_active_at(now));
        assert!(!record(None, Some(now)).is_active_at(now));
        assert!(!record(Some(now), None).is_active_at(now));
    }

    #[test]
    fn lawful_basis_round_trips_through_display() {
        for basis in [
            LawfulBasis::Consent,
            LawfulBasis::Contract,
            LawfulBasis::LegalObligation,
            LawfulBasis::VitalInterest,
            LawfulBasis::PublicTask,
            LawfulBasis::LegitimateInterest,
        ] {
            assert_eq!(basis.to_string().parse::<LawfulBasis>().unwrap(), basis);
        }
        assert_eq!(LawfulBasis::default(), LawfulBasis::Consent);
    }
}
