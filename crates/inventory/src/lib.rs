//! Inventory domain module.
//!
//! Items, the environments they occupy, and the relocation state machine.
//! Pure deterministic domain logic (no IO, no HTTP, no storage).

pub mod environment;
pub mod item;
pub mod movement;

pub use environment::Environment;
pub use item::{Item, RegisterItem};
pub use movement::{ItemPlacement, ItemRelocated, MovementRecord, RelocateItem, verify_chain};
