//! Role-based authorization policy.

use std::fmt;

use medgate_core::models::audit::AuditAction;
use medgate_core::models::identity::{Identity, Role};

/// Operations subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessAction {
    /// Read a single record.
    Read,
    /// List or search across patients.
    Search,
    Create,
    Update,
    Delete,
    /// Bulk export.
    Export,
    GrantConsent,
    RevokeConsent,
}

impl AccessAction {
    /// Action recorded in the audit trail.
    pub fn audit_action(self) -> AuditAction {
        match self {
            AccessAction::Read => AuditAction::Read,
            AccessAction::Search => AuditAction::Search,
            AccessAction::Create | AccessAction::GrantConsent => AuditAction::Create,
            AccessAction::Update | AccessAction::RevokeConsent => AuditAction::Update,
            AccessAction::Delete => AuditAction::Delete,
            AccessAction::Export => AuditAction::Export,
        }
    }

    /// Staff roles allowed regardless of who owns the resource.
    fn staff_roles(self) -> &'static [Role] {
        match self {
            AccessAction::Read
            | AccessAction::Search
            | AccessAction::Create
            | AccessAction::Update
            | AccessAction::GrantConsent => &[Role::Clinician, Role::Admin],
            AccessAction::Delete | AccessAction::Export | AccessAction::RevokeConsent => {
                &[Role::Admin]
            }
        }
    }

    /// Whether a patient may perform this action on their own data.
    fn patient_self_service(self) -> bool {
        matches!(
            self,
            AccessAction::Read | AccessAction::GrantConsent | AccessAction::RevokeConsent
        )
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessAction::Read => "read",
            AccessAction::Search => "search",
            AccessAction::Create => "create",
            AccessAction::Update => "update",
            AccessAction::Delete => "delete",
            AccessAction::Export => "export",
            AccessAction::GrantConsent => "grant consent",
            AccessAction::RevokeConsent => "revoke consent",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No usable identity (401).
    Unauthenticated,
    /// Identity present but not permitted (403).
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzDecision {
    Allow,
    Deny(DenyReason),
}

impl AuthzDecision {
    pub fn is_allowed(self) -> bool {
        self == AuthzDecision::Allow
    }
}

/// Static role policy. Performs no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleAuthorizer;

impl RoleAuthorizer {
    pub fn new() -> Self {
        Self
    }

    /// Decide whether `identity` may perform `action` on a resource
    /// owned by `resource_owner`. A patient is only ever allowed on a
    /// resource whose owner is their own linked patient id.
    pub fn authorize(
        &self,
        identity: &Identity,
        action: AccessAction,
        resource_owner: Option<i64>,
    ) -> AuthzDecision {
        if !identity.is_authenticated() {
            return AuthzDecision::Deny(DenyReason::Unauthenticated);
        }

        if action.staff_roles().iter().any(|r| identity.has_role(*r)) {
            return AuthzDecision::Allow;
        }

        let owns_resource = identity.linked_patient_id.is_some()
            && identity.linked_patient_id == resource_owner;
        if action.patient_self_service() && identity.has_role(Role::Patient) && owns_resource {
            return AuthzDecision::Allow;
        }

        AuthzDecision::Deny(DenyReason::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(roles: &[Role]) -> Identity {
        Identity::new("user-1", roles.iter().copied(), "10.0.0.1")
    }

    fn patient(linked: i64) -> Identity {
        user(&[Role::Patient]).with_linked_patient(linked)
    }

    const ALL: [AccessAction; 8] = [
        AccessAction::Read,
        AccessAction::Search,
        AccessAction::Create,
        AccessAction::Update,
        AccessAction::Delete,
        AccessAction::Export,
        AccessAction::GrantConsent,
        AccessAction::RevokeConsent,
    ];

    #[test]
    fn admin_may_do_everything() {
        let authz = RoleAuthorizer::new();
        let admin = user(&[Role::Admin]);
        for action in ALL {
            assert!(authz.authorize(&admin, action, Some(1)).is_allowed(), "{action}");
        }
    }

    #[test]
    fn clinician_policy() {
        let authz = RoleAuthorizer::new();
        let clinician = user(&[Role::Clinician]);
        for action in [
            AccessAction::Read,
            AccessAction::Search,
            AccessAction::Create,
            AccessAction::Update,
            AccessAction::GrantConsent,
        ] {
            assert!(authz.authorize(&clinician, action, None).is_allowed(), "{action}");
        }
        for action in [
            AccessAction::Delete,
            AccessAction::Export,
            AccessAction::RevokeConsent,
        ] {
            assert_eq!(
                authz.authorize(&clinician, action, None),
                AuthzDecision::Deny(DenyReason::Forbidden),
                "{action}"
            );
        }
    }

    #[test]
    fn patient_only_on_own_resources() {
        let authz = RoleAuthorizer::new();
        let p = patient(7);

        assert!(authz.authorize(&p, AccessAction::Read, Some(7)).is_allowed());
        assert!(authz.authorize(&p, AccessAction::RevokeConsent, Some(7)).is_allowed());
        assert!(authz.authorize(&p, AccessAction::GrantConsent, Some(7)).is_allowed());

        for action in ALL {
            assert_eq!(
                authz.authorize(&p, action, Some(8)),
                AuthzDecision::Deny(DenyReason::Forbidden),
                "{action}"
            );
        }
        assert!(!authz.authorize(&p, AccessAction::Read, None).is_allowed());
        assert!(!authz.authorize(&p, AccessAction::Search, Some(7)).is_allowed());
        assert!(!authz.authorize(&p, AccessAction::Update, Some(7)).is_allowed());
    }

    #[test]
    fn patient_without_link_owns_nothing() {
        let authz = RoleAuthorizer::new();
        let unlinked = user(&[Role::Patient]);
        assert!(!authz.authorize(&unlinked, AccessAction::Read, None).is_allowed());
        assert!(!authz.authorize(&unlinked, AccessAction::Read, Some(1)).is_allowed());
    }

    #[test]
    fn researcher_has_no_record_access() {
        let authz = RoleAuthorizer::new();
        let researcher = user(&[Role::Researcher]);
        for action in ALL {
            assert!(!authz.authorize(&researcher, action, Some(1)).is_allowed());
        }
    }

    #[test]
    fn anonymous_is_unauthenticated() {
        let authz = RoleAuthorizer::new();
        let anon = Identity::anonymous("10.0.0.9");
        assert_eq!(
            authz.authorize(&anon, AccessAction::Read, Some(1)),
            AuthzDecision::Deny(DenyReason::Unauthenticated)
        );
    }

    #[test]
    fn audit_actions_map_onto_log_vocabulary() {
        assert_eq!(AccessAction::GrantConsent.audit_action(), AuditAction::Create);
        assert_eq!(AccessAction::RevokeConsent.audit_action(), AuditAction::Update);
        assert_eq!(AccessAction::Export.audit_action(), AuditAction::Export);
    }
}
