use std::collections::HashSet;

use thiserror::Error;

use crate::{Permission, PrincipalId, Role};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve permissions from roles with the built-in policy.
    pub fn from_roles(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        let permissions = permissions_for_roles(&roles);
        Self {
            principal_id,
            roles,
            permissions,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let perms: HashSet<&str> = principal.permissions.iter().map(|p| p.as_str()).collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Static role→permission policy.
///
/// - `admin`: everything
/// - `operator`: register/read/move items, read environments and movements
/// - `auditor`: read-only
///
/// Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut out: Vec<&'static str> = Vec::new();

    for role in roles {
        let granted: &[&'static str] = match role.as_str() {
            Role::ADMIN => &["*"],
            Role::OPERATOR => &[
                Permission::ITEMS_READ,
                Permission::ITEMS_REGISTER,
                Permission::ITEMS_MOVE,
                Permission::ENVIRONMENTS_READ,
                Permission::MOVEMENTS_READ,
            ],
            Role::AUDITOR => &[
                Permission::ITEMS_READ,
                Permission::ENVIRONMENTS_READ,
                Permission::MOVEMENTS_READ,
            ],
            _ => &[],
        };
        for p in granted {
            if !out.contains(p) {
                out.push(p);
            }
        }
    }

    out.into_iter().map(Permission::new).collect()
}
