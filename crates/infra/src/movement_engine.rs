//! Relocation pipeline.
//!
//! `MovementEngine` is the only writer of an item's current environment and
//! the only producer of ledger entries.
//!
//! ```text
//! relocate(item, target, mover)
//!   ↓
//! 1. Take the per-item lock
//!   ↓
//! 2. Load item + target environment (NotFound if either is missing)
//!   ↓
//! 3. Decide on the item's placement (Conflict if already there)
//!   ↓
//! 4. Commit: location update + ledger append as one unit
//! ```
//!
//! Relocations of the same item are serialized by step 1; different items do
//! not contend. The commit additionally compare-and-sets the stored location,
//! so two engines sharing one database cannot fork an item's chain either.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use placetrack_core::{
    Aggregate, ConflictReason, DomainError, EntityKind, EnvironmentId, ItemId, MovementId, UserId,
};
use placetrack_inventory::{MovementRecord, RelocateItem};

use crate::store::{MovementFilter, MovementPage, Pagination, RelocationStore, StoreError};

#[derive(Debug, Error)]
pub enum MovementError {
    #[error("{0} not found")]
    NotFound(EntityKind),

    #[error("conflict: {}", .0.message())]
    Conflict(ConflictReason),

    /// Deterministic domain failure other than not-found/conflict.
    #[error(transparent)]
    Domain(DomainError),

    /// Nothing was written when this is returned.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<DomainError> for MovementError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound { entity } => MovementError::NotFound(entity),
            DomainError::Conflict { reason } => MovementError::Conflict(reason),
            other => MovementError::Domain(other),
        }
    }
}

type LockMap = Mutex<HashMap<ItemId, Arc<AsyncMutex<()>>>>;

/// Holds one item's relocation lock; drops the map slot when nobody else
/// is waiting on it.
struct ItemLock<'a> {
    locks: &'a LockMap,
    item_id: ItemId,
    slot: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ItemLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // One reference in the map, one here.
        if Arc::strong_count(&self.slot) == 2 {
            locks.remove(&self.item_id);
        }
    }
}

/// Validates and executes relocations over a [`RelocationStore`].
pub struct MovementEngine<S> {
    store: S,
    locks: LockMap,
}

impl<S> MovementEngine<S>
where
    S: RelocationStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn lock_item(&self, item_id: ItemId) -> ItemLock<'_> {
        let slot = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            locks.entry(item_id).or_default().clone()
        };
        // The slot is released by `ItemLock::drop` even if this future is
        // dropped while still waiting; `acquire` is dropped first.
        let mut lock = ItemLock {
            locks: &self.locks,
            item_id,
            slot: slot.clone(),
            guard: None,
        };
        let acquire = slot.lock_owned();
        lock.guard = Some(acquire.await);
        lock
    }

    /// Move `item_id` into `target` on behalf of `mover`.
    ///
    /// Returns the committed ledger entry. On any error neither the item nor
    /// the ledger has changed.
    pub async fn relocate(
        &self,
        item_id: ItemId,
        target: EnvironmentId,
        mover: UserId,
    ) -> Result<MovementRecord, MovementError> {
        let _lock = self.lock_item(item_id).await;

        let item = self
            .store
            .find_item(item_id)
            .await?
            .ok_or(MovementError::NotFound(EntityKind::Item))?;

        if self.store.find_environment(target).await?.is_none() {
            return Err(MovementError::NotFound(EntityKind::Environment));
        }

        let cmd = RelocateItem {
            item_id,
            target,
            mover,
            movement_id: MovementId::new(),
            occurred_at: Utc::now(),
        };

        let decided = match item.placement().handle(&cmd) {
            Ok(events) => events.into_iter().next().ok_or_else(|| {
                MovementError::Domain(DomainError::invariant("relocation produced no movement"))
            })?,
            Err(err) => {
                let err = MovementError::from(err);
                if let MovementError::Conflict(reason) = &err {
                    debug!(
                        item_id = %item_id,
                        target = %target,
                        mover = %mover,
                        reason = reason.code(),
                        "relocation rejected"
                    );
                }
                return Err(err);
            }
        };

        let record = self.store.commit_relocation(decided).await.map_err(|err| {
            match &err {
                StoreError::StaleLocation(_) | StoreError::Duplicate(_) => {
                    warn!(item_id = %item_id, target = %target, error = %err, "relocation commit rejected")
                }
                StoreError::Corrupt(_) | StoreError::Backend(_) => {
                    error!(item_id = %item_id, target = %target, error = %err, "relocation commit failed")
                }
            }
            MovementError::Storage(err)
        })?;

        info!(
            item_id = %record.item_id,
            movement_id = %record.id,
            sequence = record.sequence,
            from = ?record.previous_environment,
            to = %record.next_environment,
            mover = %record.mover,
            "item relocated"
        );

        Ok(record)
    }

    /// Ledger entries of one item, oldest first.
    pub async fn history(&self, item_id: ItemId) -> Result<Vec<MovementRecord>, MovementError> {
        if self.store.find_item(item_id).await?.is_none() {
            return Err(MovementError::NotFound(EntityKind::Item));
        }
        Ok(self.store.history(item_id).await?)
    }

    pub async fn query(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, MovementError> {
        Ok(self.store.query(filter, pagination).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use placetrack_inventory::{Environment, Item, ItemRelocated, RegisterItem};

    use super::*;
    use crate::store::{InMemoryStore, ItemStore, MovementLedger};

    /// Delegates to an in-memory store but can be told to fail commits.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        fail_commits: AtomicBool,
    }

    #[async_trait]
    impl ItemStore for FlakyStore {
        async fn find_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
            self.inner.find_item(id).await
        }
        async fn find_environment(
            &self,
            id: EnvironmentId,
        ) -> Result<Option<Environment>, StoreError> {
            self.inner.find_environment(id).await
        }
        async fn insert_item(&self, item: Item) -> Result<(), StoreError> {
            self.inner.insert_item(item).await
        }
        async fn insert_environment(&self, environment: Environment) -> Result<(), StoreError> {
            self.inner.insert_environment(environment).await
        }
        async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
            self.inner.list_items().await
        }
        async fn list_items_in(&self, environment: EnvironmentId) -> Result<Vec<Item>, StoreError> {
            self.inner.list_items_in(environment).await
        }
        async fn list_environments(&self) -> Result<Vec<Environment>, StoreError> {
            self.inner.list_environments().await
        }
    }

    #[async_trait]
    impl MovementLedger for FlakyStore {
        async fn history(&self, item_id: ItemId) -> Result<Vec<MovementRecord>, StoreError> {
            self.inner.history(item_id).await
        }
        async fn query(
            &self,
            filter: MovementFilter,
            pagination: Pagination,
        ) -> Result<MovementPage, StoreError> {
            self.inner.query(filter, pagination).await
        }
    }

    #[async_trait]
    impl RelocationStore for FlakyStore {
        async fn commit_relocation(
            &self,
            decided: ItemRelocated,
        ) -> Result<MovementRecord, StoreError> {
            if self.fail_commits.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("disk on fire".to_string()));
            }
            self.inner.commit_relocation(decided).await
        }
    }

    async fn environment<S: ItemStore>(store: &S, label: &str) -> EnvironmentId {
        let id = EnvironmentId::new();
        store
            .insert_environment(Environment::new(id, label).unwrap())
            .await
            .unwrap();
        id
    }

    async fn item_in<S: ItemStore>(store: &S, at: Option<EnvironmentId>) -> ItemId {
        let id = ItemId::new();
        let item = Item::register(RegisterItem {
            item_id: id,
            name: "oscilloscope".to_string(),
            item_type: None,
            environment_id: at,
            registered_by: UserId::new(),
            occurred_at: Utc::now(),
        })
        .unwrap();
        store.insert_item(item).await.unwrap();
        id
    }

    #[tokio::test]
    async fn relocate_updates_item_and_appends_record() {
        let engine = MovementEngine::new(InMemoryStore::new());
        let a = environment(engine.store(), "Lab A").await;
        let b = environment(engine.store(), "Lab B").await;
        let item = item_in(engine.store(), Some(a)).await;
        let mover = UserId::new();

        let record = engine.relocate(item, b, mover).await.unwrap();

        assert_eq!(record.item_id, item);
        assert_eq!(record.previous_environment, Some(a));
        assert_eq!(record.next_environment, b);
        assert_eq!(record.mover, mover);

        let stored = engine.store().find_item(item).await.unwrap().unwrap();
        assert_eq!(stored.current_environment(), Some(b));
        assert_eq!(engine.history(item).await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn first_placement_has_no_previous_environment() {
        let engine = MovementEngine::new(InMemoryStore::new());
        let a = environment(engine.store(), "Lab A").await;
        let item = item_in(engine.store(), None).await;

        let record = engine.relocate(item, a, UserId::new()).await.unwrap();
        assert_eq!(record.previous_environment, None);
        assert_eq!(record.next_environment, a);
    }

    #[tokio::test]
    async fn unknown_item_and_environment_are_distinguished() {
        let engine = MovementEngine::new(InMemoryStore::new());
        let a = environment(engine.store(), "Lab A").await;
        let item = item_in(engine.store(), Some(a)).await;

        let err = engine
            .relocate(ItemId::new(), a, UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MovementError::NotFound(EntityKind::Item)));

        let err = engine
            .relocate(item, EnvironmentId::new(), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MovementError::NotFound(EntityKind::Environment)));

        assert!(engine.history(item).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conflict_mutates_nothing() {
        let engine = MovementEngine::new(InMemoryStore::new());
        let a = environment(engine.store(), "Lab A").await;
        let item = item_in(engine.store(), Some(a)).await;

        let err = engine.relocate(item, a, UserId::new()).await.unwrap_err();
        assert!(matches!(
            err,
            MovementError::Conflict(ConflictReason::AlreadyInTargetEnvironment)
        ));

        let stored = engine.store().find_item(item).await.unwrap().unwrap();
        assert_eq!(stored.current_environment(), Some(a));
        assert!(engine.history(item).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_leaves_state_untouched() {
        let engine = MovementEngine::new(FlakyStore::default());
        let a = environment(engine.store(), "Lab A").await;
        let b = environment(engine.store(), "Lab B").await;
        let item = item_in(engine.store(), Some(a)).await;

        engine.store().fail_commits.store(true, Ordering::SeqCst);
        let err = engine.relocate(item, b, UserId::new()).await.unwrap_err();
        assert!(matches!(err, MovementError::Storage(StoreError::Backend(_))));

        let stored = engine.store().find_item(item).await.unwrap().unwrap();
        assert_eq!(stored.current_environment(), Some(a));
        assert!(engine.history(item).await.unwrap().is_empty());

        engine.store().fail_commits.store(false, Ordering::SeqCst);
        let record = engine.relocate(item, b, UserId::new()).await.unwrap();
        assert_eq!(record.previous_environment, Some(a));
    }

    #[tokio::test]
    async fn history_of_unknown_item_is_not_found() {
        let engine = MovementEngine::new(InMemoryStore::new());
        let err = engine.history(ItemId::new()).await.unwrap_err();
        assert!(matches!(err, MovementError::NotFound(EntityKind::Item)));
    }

    #[tokio::test]
    async fn item_locks_are_released() {
        let engine = MovementEngine::new(InMemoryStore::new());
        let a = environment(engine.store(), "Lab A").await;
        let b = environment(engine.store(), "Lab B").await;
        let item = item_in(engine.store(), Some(a)).await;

        engine.relocate(item, b, UserId::new()).await.unwrap();
        engine.relocate(item, b, UserId::new()).await.unwrap_err();

        assert!(engine.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_its_lock_slot() {
        let engine = MovementEngine::new(InMemoryStore::new());
        let item = ItemId::new();

        let held = engine.lock_item(item).await;
        {
            let mut waiting = std::pin::pin!(engine.lock_item(item));
            let timed_out = tokio::time::timeout(Duration::from_millis(10), &mut waiting)
                .await
                .is_err();
            assert!(timed_out);

            // Holder goes away while the waiter is still queued.
            drop(held);
            assert_eq!(engine.locks.lock().unwrap().len(), 1);
        }

        assert!(engine.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn domain_errors_map_to_movement_errors() {
        assert!(matches!(
            MovementError::from(DomainError::not_found(EntityKind::Environment)),
            MovementError::NotFound(EntityKind::Environment)
        ));
        assert!(matches!(
            MovementError::from(DomainError::validation("bad")),
            MovementError::Domain(DomainError::Validation(_))
        ));
    }
}
