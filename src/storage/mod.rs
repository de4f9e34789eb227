//! Storage for facts and inventory items.
//!
//! The traits define the abstract interface; the in-memory backend is the
//! reference implementation and the codec serializes it to bytes for an
//! external durable-storage collaborator.

pub mod codec;
mod memory;
mod traits;

pub use memory::{InMemoryFactStore, InMemoryInventoryStore};
pub use traits::{FactStore, InventoryStore, LinkWrite, StorageError, SyntheticWrite};
