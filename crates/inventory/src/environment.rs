use serde::{Deserialize, Serialize};

use placetrack_core::{DomainError, DomainResult, Entity, EnvironmentId};

const MAX_LABEL_LEN: usize = 100;

/// A named location an item can occupy. Read-only to the movement subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    id: EnvironmentId,
    label: String,
}

impl Environment {
    pub fn new(id: EnvironmentId, label: impl Into<String>) -> DomainResult<Self> {
        let label = label.into().trim().to_string();
        if label.is_empty() {
            return Err(DomainError::validation("label cannot be empty"));
        }
        if label.chars().count() > MAX_LABEL_LEN {
            return Err(DomainError::validation(format!(
                "label cannot exceed {MAX_LABEL_LEN} characters"
            )));
        }
        Ok(Self { id, label })
    }

    pub fn id_typed(&self) -> EnvironmentId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Entity for Environment {
    type Id = EnvironmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
