//! Infrastructure layer: storage backends and the movement engine.

pub mod movement_engine;
pub mod store;


pub use movement_engine::{MovementEngine, MovementError};
pub use store::{
    InMemoryStore, ItemStore, MovementFilter, MovementLedger, MovementPage, Pagination,
    PostgresStore, RelocationStore, StoreError,
};
