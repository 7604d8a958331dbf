//! API-side authorization guard.
//!
//! This enforces authorization at the request boundary (before the engine or
//! store is called), while keeping domain and infra auth-agnostic.

use placetrack_auth::{AuthzError, Permission, Principal, authorize};

use crate::context::PrincipalContext;

/// Check that the current principal holds `required`.
pub fn authorize_request(
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<(), AuthzError> {
    let principal = Principal::from_roles(principal.principal_id(), principal.roles().to_vec());
    authorize(&principal, required)
}
