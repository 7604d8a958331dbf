use placetrack_auth::{PrincipalId, Role};
use placetrack_core::UserId;

/// Principal context for a request (authenticated identity + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    /// The principal as the acting user recorded on movements/registrations.
    pub fn user_id(&self) -> UserId {
        self.principal_id.into()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
