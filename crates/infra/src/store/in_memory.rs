use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use placetrack_core::{EnvironmentId, ItemId};
use placetrack_inventory::{Environment, Item, ItemRelocated, MovementRecord};

use super::query::{MovementFilter, MovementPage, Pagination};
use super::r#trait::{ItemStore, MovementLedger, RelocationStore, StoreError};

#[derive(Debug, Default)]
struct State {
    items: HashMap<ItemId, Item>,
    environments: HashMap<EnvironmentId, Environment>,
    ledger: Vec<MovementRecord>,
}

/// In-memory item store + ledger.
///
/// Intended for tests/dev. Not optimized for performance. One lock guards
/// items and ledger together, which is what makes a relocation commit atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

fn sorted_items<'a>(items: impl Iterator<Item = &'a Item>) -> Vec<Item> {
    let mut out: Vec<Item> = items.cloned().collect();
    out.sort_by_key(|i| i.id_typed());
    out
}

#[async_trait]
impl ItemStore for InMemoryStore {
    async fn find_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn find_environment(&self, id: EnvironmentId) -> Result<Option<Environment>, StoreError> {
        Ok(self.read()?.environments.get(&id).cloned())
    }

    async fn insert_item(&self, item: Item) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let id = item.id_typed();
        if state.items.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("item {id}")));
        }
        state.items.insert(id, item);
        Ok(())
    }

    async fn insert_environment(&self, environment: Environment) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let id = environment.id_typed();
        if state.environments.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("environment {id}")));
        }
        state.environments.insert(id, environment);
        Ok(())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        Ok(sorted_items(self.read()?.items.values()))
    }

    async fn list_items_in(&self, environment: EnvironmentId) -> Result<Vec<Item>, StoreError> {
        let state = self.read()?;
        Ok(sorted_items(
            state
                .items
                .values()
                .filter(|i| i.current_environment() == Some(environment)),
        ))
    }

    async fn list_environments(&self) -> Result<Vec<Environment>, StoreError> {
        let mut out: Vec<Environment> = self.read()?.environments.values().cloned().collect();
        out.sort_by_key(|e| e.id_typed());
        Ok(out)
    }
}

#[async_trait]
impl MovementLedger for InMemoryStore {
    async fn history(&self, item_id: ItemId) -> Result<Vec<MovementRecord>, StoreError> {
        Ok(self
            .read()?
            .ledger
            .iter()
            .filter(|r| r.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn query(
        &self,
        filter: MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        let state = self.read()?;
        let matching: Vec<&MovementRecord> =
            state.ledger.iter().filter(|r| filter.matches(r)).collect();
        let total = matching.len() as u64;

        let records = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect();

        Ok(MovementPage::new(records, total, pagination))
    }
}

#[async_trait]
impl RelocationStore for InMemoryStore {
    async fn commit_relocation(&self, decided: ItemRelocated) -> Result<MovementRecord, StoreError> {
        let mut guard = self.write()?;
        let state = &mut *guard;

        if !state.environments.contains_key(&decided.next_environment) {
            return Err(StoreError::StaleLocation(format!(
                "environment {} no longer exists",
                decided.next_environment
            )));
        }

        let item = state.items.get_mut(&decided.item_id).ok_or_else(|| {
            StoreError::StaleLocation(format!("item {} no longer exists", decided.item_id))
        })?;

        let sequence = state.ledger.last().map(|r| r.sequence).unwrap_or(0) + 1;
        let floor = state.ledger.last().map(|r| r.moved_at);
        let record = MovementRecord::commit(decided, sequence, floor);

        // Item first: if the compare-and-set fails nothing has been appended yet.
        item.apply_movement(&record)
            .map_err(|e| StoreError::StaleLocation(e.to_string()))?;
        state.ledger.push(record.clone());

        Ok(record)
    }
}
