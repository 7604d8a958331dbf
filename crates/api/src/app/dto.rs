use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use placetrack_core::EnvironmentId;
use placetrack_infra::MovementPage;
use placetrack_inventory::{Environment, Item, MovementRecord};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub label: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterItemRequest {
    pub name: String,
    pub item_type: Option<String>,
    /// Initial placement; omitted means not yet placed.
    pub environment_id: Option<String>,
}

/// `GET /movements` query string.
#[derive(Debug, Deserialize)]
pub struct MovementListQuery {
    pub item_id: Option<String>,
    pub environment_id: Option<String>,
    pub mover: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentResponse {
    pub id: Uuid,
    pub label: String,
}

impl From<&Environment> for EnvironmentResponse {
    fn from(env: &Environment) -> Self {
        Self {
            id: *env.id_typed().as_uuid(),
            label: env.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    pub id: Uuid,
    pub name: String,
    pub item_type: Option<String>,
    pub current_environment: Option<EnvironmentResponse>,
    pub registered_by: Uuid,
    pub registered_at: DateTime<Utc>,
}

impl ItemResponse {
    pub fn new(item: &Item, environment: Option<&Environment>) -> Self {
        Self {
            id: *item.id_typed().as_uuid(),
            name: item.name().to_string(),
            item_type: item.item_type().map(str::to_string),
            current_environment: environment.map(EnvironmentResponse::from),
            registered_by: *item.registered_by().as_uuid(),
            registered_at: item.registered_at(),
        }
    }

    /// Join a list of items against an environment index.
    pub fn list(items: &[Item], environments: &HashMap<EnvironmentId, Environment>) -> Vec<Self> {
        items
            .iter()
            .map(|item| {
                let env = item.current_environment().and_then(|e| environments.get(&e));
                Self::new(item, env)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementResponse {
    pub id: Uuid,
    pub sequence: u64,
    pub item_id: Uuid,
    pub previous_environment_id: Option<Uuid>,
    pub next_environment_id: Uuid,
    pub mover: Uuid,
    pub moved_at: DateTime<Utc>,
}

impl From<&MovementRecord> for MovementResponse {
    fn from(r: &MovementRecord) -> Self {
        Self {
            id: *r.id.as_uuid(),
            sequence: r.sequence,
            item_id: *r.item_id.as_uuid(),
            previous_environment_id: r.previous_environment.map(|e| *e.as_uuid()),
            next_environment_id: *r.next_environment.as_uuid(),
            mover: *r.mover.as_uuid(),
            moved_at: r.moved_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationResponse {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovementPageResponse {
    pub movements: Vec<MovementResponse>,
    pub total: u64,
    pub pagination: PaginationResponse,
    pub has_more: bool,
}

impl From<&MovementPage> for MovementPageResponse {
    fn from(page: &MovementPage) -> Self {
        Self {
            movements: page.records.iter().map(MovementResponse::from).collect(),
            total: page.total,
            pagination: PaginationResponse {
                limit: page.pagination.limit,
                offset: page.pagination.offset,
            },
            has_more: page.has_more,
        }
    }
}
