use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use placetrack_core::{EnvironmentId, ItemId};
use placetrack_inventory::{Environment, Item, ItemRelocated, MovementRecord};

use super::query::{MovementFilter, MovementPage, Pagination};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors
/// (validation, conflicts). None of them leave a partial write behind.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The item's stored location no longer matches the one the relocation was
    /// decided on. Nothing was written.
    #[error("stale item location: {0}")]
    StaleLocation(String),

    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// A stored row could not be turned back into a domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Backend unavailable or failed mid-operation.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Lookup and registration of items and environments.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn find_item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    async fn find_environment(&self, id: EnvironmentId) -> Result<Option<Environment>, StoreError>;

    /// Register a new item with its initial placement.
    async fn insert_item(&self, item: Item) -> Result<(), StoreError>;

    async fn insert_environment(&self, environment: Environment) -> Result<(), StoreError>;

    /// All items, ordered by id.
    async fn list_items(&self) -> Result<Vec<Item>, StoreError>;

    /// Items currently located in `environment`, ordered by id.
    async fn list_items_in(&self, environment: EnvironmentId) -> Result<Vec<Item>, StoreError>;

    /// All environments, ordered by id.
    async fn list_environments(&self) -> Result<Vec<Environment>, StoreError>;
}

/// Read-only view of the append-only movement ledger.
///
/// There is deliberately no update or delete here.
#[async_trait]
pub trait MovementLedger: Send + Sync {
    /// All movements of one item, oldest first. Empty if it never moved.
    async fn history(&self, item_id: ItemId) -> Result<Vec<MovementRecord>, StoreError>;

    /// Filtered, paginated ledger scan in ledger order.
    async fn query(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError>;
}

/// Atomic write side of a relocation.
#[async_trait]
pub trait RelocationStore: ItemStore + MovementLedger {
    /// Move the item and append the ledger entry as one unit.
    ///
    /// Implementations must:
    /// - compare-and-set the item's location against `decided.previous_environment`
    ///   (otherwise fail with `StaleLocation`)
    /// - assign the next ledger sequence and a non-decreasing timestamp
    /// - write both or neither
    async fn commit_relocation(&self, decided: ItemRelocated) -> Result<MovementRecord, StoreError>;
}

#[async_trait]
impl<S> ItemStore for Arc<S>
where
    S: ItemStore + ?Sized,
{
    async fn find_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).find_item(id).await
    }

    async fn find_environment(&self, id: EnvironmentId) -> Result<Option<Environment>, StoreError> {
        (**self).find_environment(id).await
    }

    async fn insert_item(&self, item: Item) -> Result<(), StoreError> {
        (**self).insert_item(item).await
    }

    async fn insert_environment(&self, environment: Environment) -> Result<(), StoreError> {
        (**self).insert_environment(environment).await
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        (**self).list_items().await
    }

    async fn list_items_in(&self, environment: EnvironmentId) -> Result<Vec<Item>, StoreError> {
        (**self).list_items_in(environment).await
    }

    async fn list_environments(&self) -> Result<Vec<Environment>, StoreError> {
        (**self).list_environments().await
    }
}

#[async_trait]
impl<S> MovementLedger for Arc<S>
where
    S: MovementLedger + ?Sized,
{
    async fn history(&self, item_id: ItemId) -> Result<Vec<MovementRecord>, StoreError> {
        (**self).history(item_id).await
    }

    async fn query(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        (**self).query(filter, pagination).await
    }
}

#[async_trait]
impl<S> RelocationStore for Arc<S>
where
    S: RelocationStore + ?Sized,
{
    async fn commit_relocation(&self, decided: ItemRelocated) -> Result<MovementRecord, StoreError> {
        (**self).commit_relocation(decided).await
    }
}
