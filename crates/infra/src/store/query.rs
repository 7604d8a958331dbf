//! Ledger query parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use placetrack_core::{EnvironmentId, ItemId, UserId};
use placetrack_inventory::MovementRecord;

/// Pagination parameters for ledger queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).clamp(1, 1000),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for ledger queries. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub item_id: Option<ItemId>,
    /// Matches moves into *or* out of the environment.
    pub environment_id: Option<EnvironmentId>,
    pub mover: Option<UserId>,
    /// Inclusive lower bound on `moved_at`.
    pub moved_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `moved_at`.
    pub moved_before: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn matches(&self, r: &MovementRecord) -> bool {
        self.item_id.is_none_or(|id| r.item_id == id)
            && self.environment_id.is_none_or(|env| r.involves(env))
            && self.mover.is_none_or(|m| r.mover == m)
            && self.moved_after.is_none_or(|t| r.moved_at >= t)
            && self.moved_before.is_none_or(|t| r.moved_at <= t)
    }
}

/// One page of ledger records, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    pub records: Vec<MovementRecord>,
    /// Number of records matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

impl MovementPage {
    pub fn new(records: Vec<MovementRecord>, total: u64, pagination: Pagination) -> Self {
        let has_more = u64::from(pagination.offset) + (records.len() as u64) < total;
        Self {
            records,
            total,
            pagination,
            has_more,
        }
    }
}
