//! Abstract storage traits for dealfacts.
//!
//! Components receive explicit `Arc<dyn FactStore>` / `Arc<dyn InventoryStore>`
//! handles; there is no ambient global store. Every method takes `&self` so a
//! store can be shared across components, with implementations guarding their
//! own state.

use thiserror::Error;

use crate::error::ValidationError;
use crate::fact::{Fact, FactFilter, NewFact};
use crate::ids::{FactId, ItemId};
use crate::inventory::{InventoryItem, ItemFilter, NewItem};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Fact not found.
    #[error("Fact not found: {0}")]
    FactNotFound(FactId),

    /// Inventory item not found.
    #[error("Inventory item not found: {0}")]
    ItemNotFound(ItemId),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Input rejected at the store boundary.
    #[error("Invalid input: {0}")]
    Invalid(#[from] ValidationError),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Snapshot encoding or decoding failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Capability required for deleting or re-inserting facts.
///
/// Only the assumption lifecycle can construct one, which keeps observed
/// facts append-only for every other caller.
#[derive(Debug)]
pub struct SyntheticWrite(());

impl SyntheticWrite {
    pub(crate) const fn new() -> Self {
        Self(())
    }
}

/// Capability required for writing fact ↔ item cross-references.
///
/// Only the linker and the assumption lifecycle construct one, so both
/// directions of a reference are always written together.
///
/// Code outside the crate cannot mint one:
///
/// ```compile_fail
/// let cap = dealfacts::storage::LinkWrite::new();
/// ```
#[derive(Debug)]
pub struct LinkWrite(());

impl LinkWrite {
    pub(crate) const fn new() -> Self {
        Self(())
    }
}

/// Storage trait for the fact log.
pub trait FactStore: Send + Sync {
    /// Validate and append a fact. No inventory side effect.
    fn add_fact(&self, fact: NewFact) -> Result<FactId, StorageError>;

    /// Get a fact by ID.
    fn get_fact(&self, id: &FactId) -> Result<Option<Fact>, StorageError>;

    /// Snapshot of matching facts in log order. Not a live view.
    fn get_facts(&self, filter: &FactFilter) -> Result<Vec<Fact>, StorageError>;

    /// Set or clear the inventory back-reference, returning the previous value.
    fn set_inventory_link(
        &self,
        cap: &LinkWrite,
        id: &FactId,
        item_id: Option<ItemId>,
    ) -> Result<Option<ItemId>, StorageError>;

    /// Remove synthetic facts matching `predicate`; observed facts are never removed.
    fn remove_facts(
        &self,
        cap: &SyntheticWrite,
        predicate: &dyn Fn(&Fact) -> bool,
    ) -> Result<usize, StorageError>;

    /// Re-insert previously removed facts verbatim (ids and back-references kept).
    fn restore_facts(&self, cap: &SyntheticWrite, facts: Vec<Fact>) -> Result<(), StorageError>;

    /// Number of stored facts.
    fn len(&self) -> Result<usize, StorageError>;

    /// Returns true if no facts are stored.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

/// Storage trait for the deduplicated inventory.
pub trait InventoryStore: Send + Sync {
    /// Add an item, or return the id of the active item with the same fingerprint.
    fn add_item(&self, item: NewItem) -> Result<ItemId, StorageError>;

    /// Get an item by ID (active or removed).
    fn get_item(&self, id: &ItemId) -> Result<Option<InventoryItem>, StorageError>;

    /// Snapshot of matching items in insertion order.
    fn get_items(&self, filter: &ItemFilter) -> Result<Vec<InventoryItem>, StorageError>;

    /// Append a fact reference. Returns false if it was already present.
    fn attach_fact(&self, cap: &LinkWrite, id: &ItemId, fact_id: &FactId) -> Result<bool, StorageError>;

    /// Drop a fact reference. Returns false if it was not present.
    fn detach_fact(&self, cap: &LinkWrite, id: &ItemId, fact_id: &FactId) -> Result<bool, StorageError>;

    /// Soft-delete an item. It stops participating in dedup.
    fn remove_item(&self, id: &ItemId) -> Result<(), StorageError>;

    /// Number of stored items, including removed ones.
    fn len(&self) -> Result<usize, StorageError>;

    /// Returns true if no items are stored.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}
