use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "items.move").
/// A special wildcard permission `"*"` means "allow all".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const ITEMS_READ: &'static str = "items.read";
    pub const ITEMS_REGISTER: &'static str = "items.register";
    pub const ITEMS_MOVE: &'static str = "items.move";
    pub const ENVIRONMENTS_READ: &'static str = "environments.read";
    pub const ENVIRONMENTS_CREATE: &'static str = "environments.create";
    pub const MOVEMENTS_READ: &'static str = "movements.read";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
