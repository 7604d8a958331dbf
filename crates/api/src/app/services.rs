//! Storage selection and the operations handlers call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;

use placetrack_core::{EntityKind, EnvironmentId, ItemId, UserId};
use placetrack_infra::{
    InMemoryStore, ItemStore, MovementEngine, MovementError, PostgresStore, RelocationStore,
    StoreError,
};
use placetrack_inventory::{Environment, Item, RegisterItem};

use crate::config::StorageConfig;

pub type Engine = MovementEngine<Arc<dyn RelocationStore>>;

/// Everything a request handler needs.
pub struct AppServices {
    engine: Engine,
}

impl AppServices {
    pub fn new(store: Arc<dyn RelocationStore>) -> Self {
        Self {
            engine: MovementEngine::new(store),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    pub async fn from_config(storage: &StorageConfig) -> Result<Self, StoreError> {
        match storage {
            StorageConfig::InMemory => {
                tracing::info!("using in-memory stores");
                Ok(Self::in_memory())
            }
            StorageConfig::Postgres { database_url } => {
                let pool = PgPool::connect(database_url).await.map_err(|e| {
                    StoreError::Backend(format!("failed to connect to Postgres: {e}"))
                })?;
                let store = PostgresStore::new(pool);
                store.ensure_schema().await?;
                tracing::info!("using Postgres stores");
                Ok(Self::new(Arc::new(store)))
            }
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<dyn RelocationStore> {
        self.engine.store()
    }

    pub async fn create_environment(&self, label: String) -> Result<Environment, MovementError> {
        let environment = Environment::new(EnvironmentId::new(), label)?;
        self.store().insert_environment(environment.clone()).await?;
        tracing::info!(
            environment_id = %environment.id_typed(),
            label = environment.label(),
            "environment created"
        );
        Ok(environment)
    }

    /// Register an item, optionally placing it in an existing environment.
    ///
    /// Initial placement is not a movement and produces no ledger entry.
    pub async fn register_item(
        &self,
        registered_by: UserId,
        name: String,
        item_type: Option<String>,
        environment_id: Option<EnvironmentId>,
    ) -> Result<Item, MovementError> {
        if let Some(env) = environment_id {
            if self.store().find_environment(env).await?.is_none() {
                return Err(MovementError::NotFound(EntityKind::Environment));
            }
        }

        let item = Item::register(RegisterItem {
            item_id: ItemId::new(),
            name,
            item_type,
            environment_id,
            registered_by,
            occurred_at: Utc::now(),
        })?;
        self.store().insert_item(item.clone()).await?;

        tracing::info!(
            item_id = %item.id_typed(),
            environment_id = ?item.current_environment(),
            registered_by = %registered_by,
            "item registered"
        );
        Ok(item)
    }

    /// Load an item together with its current environment.
    pub async fn item_with_environment(
        &self,
        item_id: ItemId,
    ) -> Result<(Item, Option<Environment>), MovementError> {
        let item = self
            .store()
            .find_item(item_id)
            .await?
            .ok_or(MovementError::NotFound(EntityKind::Item))?;

        let environment = match item.current_environment() {
            Some(env) => self.store().find_environment(env).await?,
            None => None,
        };
        Ok((item, environment))
    }

    /// Environments keyed by id, for joining item lists.
    pub async fn environment_index(&self) -> Result<HashMap<EnvironmentId, Environment>, StoreError> {
        Ok(self
            .store()
            .list_environments()
            .await?
            .into_iter()
            .map(|e| (e.id_typed(), e))
            .collect())
    }
}
