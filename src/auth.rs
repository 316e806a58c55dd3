// Authorization Policy
// A single policy table maps (caller role, resource, access kind) to
// allow/deny. Every protected operation goes through authorize() before any
// validation runs, so a denied caller never learns the validation state of
// its payload.

use crate::errors::ApiError;

// ============================================================================
// ROLES
// ============================================================================

/// Privilege tier of a caller identity. Tokens resolve to one of the
/// authenticated tiers; anything without a valid token is Anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Anonymous,
    User,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Anonymous => "anonymous",
            Role::User => "user",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    /// Parse the role code stored alongside a token. Anonymous is never
    /// stored; a token always grants an authenticated tier.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "user" => Some(Role::User),
            "staff" => Some(Role::Staff),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller identity the HTTP layer resolves from a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub role: Role,
}

impl Caller {
    pub fn new(role: Role) -> Self {
        Caller { role }
    }

    pub fn anonymous() -> Self {
        Caller {
            role: Role::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.role != Role::Anonymous
    }

    pub fn is_admin_or_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Staff)
    }
}

// ============================================================================
// POLICY TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Departamentos,
    Sensores,
    Eventos,
}

/// Read covers the safe verbs; Write covers create, update and delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// The whole policy in one place:
///
/// | Resource      | Read              | Write             |
/// |---------------|-------------------|-------------------|
/// | Departamentos | admin             | admin             |
/// | Sensores      | any authenticated | admin/staff       |
/// | Eventos       | any authenticated | any authenticated |
///
/// Unauthenticated callers are denied everything here; the public info
/// endpoint never calls authorize.
pub fn authorize(caller: &Caller, resource: Resource, access: Access) -> Result<(), ApiError> {
    if !caller.is_authenticated() {
        return Err(ApiError::Unauthenticated);
    }

    let allowed = match (resource, access) {
        (Resource::Departamentos, _) => caller.role == Role::Admin,
        (Resource::Sensores, Access::Read) => true,
        (Resource::Sensores, Access::Write) => caller.is_admin_or_staff(),
        (Resource::Eventos, _) => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const RESOURCES: [Resource; 3] = [
        Resource::Departamentos,
        Resource::Sensores,
        Resource::Eventos,
    ];

    #[test]
    fn test_anonymous_denied_everywhere() {
        let caller = Caller::anonymous();
        for resource in RESOURCES {
            for access in [Access::Read, Access::Write] {
                match authorize(&caller, resource, access) {
                    Err(ApiError::Unauthenticated) => {}
                    other => panic!("expected Unauthenticated, got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_departamentos_are_admin_only() {
        let admin = Caller::new(Role::Admin);
        assert!(authorize(&admin, Resource::Departamentos, Access::Read).is_ok());
        assert!(authorize(&admin, Resource::Departamentos, Access::Write).is_ok());

        for role in [Role::User, Role::Staff] {
            let caller = Caller::new(role);
            for access in [Access::Read, Access::Write] {
                match authorize(&caller, Resource::Departamentos, access) {
                    Err(ApiError::Forbidden) => {}
                    other => panic!("expected Forbidden for {:?}, got {:?}", role, other),
                }
            }
        }
    }

    #[test]
    fn test_sensores_readable_by_any_authenticated() {
        for role in [Role::User, Role::Staff, Role::Admin] {
            let caller = Caller::new(role);
            assert!(authorize(&caller, Resource::Sensores, Access::Read).is_ok());
        }
    }

    #[test]
    fn test_sensores_writable_by_admin_and_staff_only() {
        assert!(authorize(&Caller::new(Role::Admin), Resource::Sensores, Access::Write).is_ok());
        assert!(authorize(&Caller::new(Role::Staff), Resource::Sensores, Access::Write).is_ok());

        match authorize(&Caller::new(Role::User), Resource::Sensores, Access::Write) {
            Err(ApiError::Forbidden) => {}
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[test]
    fn test_eventos_open_to_any_authenticated() {
        for role in [Role::User, Role::Staff, Role::Admin] {
            let caller = Caller::new(role);
            assert!(authorize(&caller, Resource::Eventos, Access::Read).is_ok());
            assert!(authorize(&caller, Resource::Eventos, Access::Write).is_ok());
        }
    }

    #[test]
    fn test_role_parse_round_trip() {
        for role in [Role::User, Role::Staff, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("anonymous"), None);
        assert_eq!(Role::parse("root"), None);
    }
}
