//! Item store + movement ledger boundary.
//!
//! The item store holds current-location state; the ledger is the append-only
//! list of movement records. They are separate read surfaces, but writes to
//! an item's location only happen together with a ledger append, through
//! [`RelocationStore::commit_relocation`].

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{MovementFilter, MovementPage, Pagination};
pub use r#trait::{ItemStore, MovementLedger, RelocationStore, StoreError};
