use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use placetrack_core::{DomainError, DomainResult, Entity, EnvironmentId, ItemId, UserId};

use crate::movement::{ItemPlacement, MovementRecord};

const MAX_NAME_LEN: usize = 100;
const MAX_TYPE_LEN: usize = 50;

/// Command: RegisterItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterItem {
    pub item_id: ItemId,
    pub name: String,
    pub item_type: Option<String>,
    pub environment_id: Option<EnvironmentId>,
    pub registered_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// A tracked physical asset.
///
/// `current_environment` is only ever changed through [`Item::apply_movement`],
/// which the movement ledger calls as part of committing a relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    id: ItemId,
    name: String,
    item_type: Option<String>,
    registered_by: UserId,
    registered_at: DateTime<Utc>,
    current_environment: Option<EnvironmentId>,
}

impl Item {
    /// Validate and build a new item. The initial placement is not a movement.
    pub fn register(cmd: RegisterItem) -> DomainResult<Self> {
        let name = cmd.name.trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(format!(
                "name cannot exceed {MAX_NAME_LEN} characters"
            )));
        }

        let item_type = match cmd.item_type.map(|t| t.trim().to_string()) {
            Some(t) if t.is_empty() => None,
            Some(t) if t.chars().count() > MAX_TYPE_LEN => {
                return Err(DomainError::validation(format!(
                    "item_type cannot exceed {MAX_TYPE_LEN} characters"
                )));
            }
            other => other,
        };

        Ok(Self {
            id: cmd.item_id,
            name,
            item_type,
            registered_by: cmd.registered_by,
            // Storage keeps microseconds.
            registered_at: cmd.occurred_at.trunc_subsecs(6),
            current_environment: cmd.environment_id,
        })
    }

    /// Rebuild an item from persisted columns (no validation).
    pub fn restore(
        id: ItemId,
        name: String,
        item_type: Option<String>,
        registered_by: UserId,
        registered_at: DateTime<Utc>,
        current_environment: Option<EnvironmentId>,
    ) -> Self {
        Self {
            id,
            name,
            item_type,
            registered_by,
            registered_at,
            current_environment,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn item_type(&self) -> Option<&str> {
        self.item_type.as_deref()
    }

    pub fn registered_by(&self) -> UserId {
        self.registered_by
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn current_environment(&self) -> Option<EnvironmentId> {
        self.current_environment
    }

    /// Location state machine view of this item.
    pub fn placement(&self) -> ItemPlacement {
        ItemPlacement::at(self.id, self.current_environment)
    }

    /// Move the item along a committed record.
    ///
    /// Compare-and-set: the record must start from the environment the item is
    /// currently in, otherwise nothing changes.
    pub fn apply_movement(&mut self, record: &MovementRecord) -> Result<(), DomainError> {
        if record.item_id != self.id {
            return Err(DomainError::invariant("movement belongs to another item"));
        }
        if record.previous_environment != self.current_environment {
            return Err(DomainError::invariant(
                "movement does not start from the item's current environment",
            ));
        }
        self.current_environment = Some(record.next_environment);
        Ok(())
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
