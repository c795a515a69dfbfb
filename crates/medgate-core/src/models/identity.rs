//! Caller identity as asserted by the authentication collaborator.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Patient,
    Clinician,
    Admin,
    Researcher,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Patient => "Patient",
            Role::Clinician => "Clinician",
            Role::Admin => "Admin",
            Role::Researcher => "Researcher",
        };
        f.write_str(name)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "clinician" => Ok(Role::Clinician),
            "admin" => Ok(Role::Admin),
            "researcher" => Ok(Role::Researcher),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Request-scoped identity. Immutable for the lifetime of a request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub roles: BTreeSet<Role>,
    /// Set when the user is themselves a patient.
    pub linked_patient_id: Option<i64>,
    pub source_address: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
        source_address: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            roles: roles.into_iter().collect(),
            linked_patient_id: None,
            source_address: source_address.into(),
        }
    }

    /// Identity for a request that carried no credentials.
    pub fn anonymous(source_address: impl Into<String>) -> Self {
        Self {
            user_id: String::new(),
            roles: BTreeSet::new(),
            linked_patient_id: None,
            source_address: source_address.into(),
        }
    }

    pub fn with_linked_patient(mut self, patient_id: i64) -> Self {
        self.linked_patient_id = Some(patient_id);
        self
    }

    /// Only emptiness is checked; the credentials themselves were
    /// validated upstream.
    pub fn is_authenticated(&self) -> bool {
        !self.user_id.trim().is_empty() && !self.roles.is_empty()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// User id as written to the audit trail.
    pub fn audit_user(&self) -> &str {
        if self.user_id.trim().is_empty() {
            "Anonymous"
        } else {
            &self.user_id
        }
    }

    pub fn role_summary(&self) -> String {
        if self.roles.is_empty() {
            return "Unknown".into();
        }
        self.roles
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!("CLINICIAN".parse::<Role>().unwrap(), Role::Clinician);
        assert_eq!(" admin ".parse::<Role>().unwrap(), Role::Admin);
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn empty_identity_is_unauthenticated() {
        let anon = Identity::anonymous("10.0.0.1");
        assert!(!anon.is_authenticated());
        assert_eq!(anon.audit_user(), "Anonymous");
        assert_eq!(anon.role_summary(), "Unknown");

        let no_roles = Identity::new("u-1", [], "10.0.0.1");
        assert!(!no_roles.is_authenticated());
    }

    #[test]
    fn role_summary_lists_all_roles() {
        let id = Identity::new("dr-who", [Role::Admin, Role::Clinician], "::1");
        assert!(id.is_authenticated());
        assert_eq!(id.role_summary(), "Clinician,Admin");
    }
}
