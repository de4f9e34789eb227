//! In-memory storage backend.
//!
//! Thread-safe implementations of the storage traits: one `RwLock` per store,
//! so each store operation is individually atomic. Reads return cloned
//! snapshots.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::fact::{Fact, FactFilter, NewFact};
use crate::ids::{FactId, ItemId};
use crate::inventory::{InventoryItem, ItemFilter, ItemStatus, NewItem};
use crate::storage::traits::{FactStore, InventoryStore, LinkWrite, StorageError, SyntheticWrite};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct FactState {
    order: Vec<FactId>,
    by_id: HashMap<FactId, Fact>,
}

impl FactState {
    fn push(&mut self, fact: Fact) -> Result<(), StorageError> {
        if self.by_id.contains_key(&fact.id) {
            return Err(StorageError::DuplicateKey(fact.id.to_string()));
        }
        self.order.push(fact.id.clone());
        self.by_id.insert(fact.id.clone(), fact);
        Ok(())
    }
}

/// Thread-safe in-memory fact log.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    state: RwLock<FactState>,
}

impl InMemoryFactStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from stored facts, preserving order and back-references.
    ///
    /// # Errors
    /// Returns `StorageError::DuplicateKey` if two facts share an id.
    pub fn from_facts(facts: Vec<Fact>) -> Result<Self, StorageError> {
        let mut state = FactState::default();
        for fact in facts {
            state.push(fact)?;
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

impl FactStore for InMemoryFactStore {
    fn add_fact(&self, fact: NewFact) -> Result<FactId, StorageError> {
        let fact = fact.into_fact()?;
        let id = fact.id.clone();
        let mut state = self.state.write().map_err(|_| lock_err("fact.add"))?;
        state.push(fact)?;
        Ok(id)
    }

    fn get_fact(&self, id: &FactId) -> Result<Option<Fact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.get"))?;
        Ok(state.by_id.get(id).cloned())
    }

    fn get_facts(&self, filter: &FactFilter) -> Result<Vec<Fact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.get_facts"))?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.by_id.get(id))
            .filter(|f| filter.matches(f))
            .cloned()
            .collect())
    }

    fn set_inventory_link(
        &self,
        _cap: &LinkWrite,
        id: &FactId,
        item_id: Option<ItemId>,
    ) -> Result<Option<ItemId>, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.set_inventory_link"))?;
        let fact = state
            .by_id
            .get_mut(id)
            .ok_or_else(|| StorageError::FactNotFound(id.clone()))?;
        Ok(std::mem::replace(&mut fact.inventory_item_id, item_id))
    }

    fn remove_facts(
        &self,
        _cap: &SyntheticWrite,
        predicate: &dyn Fn(&Fact) -> bool,
    ) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.remove"))?;
        let doomed: HashSet<FactId> = state
            .by_id
            .values()
            .filter(|f| f.is_assumed() && predicate(f))
            .map(|f| f.id.clone())
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }
        state.order.retain(|id| !doomed.contains(id));
        for id in &doomed {
            state.by_id.remove(id);
        }
        Ok(doomed.len())
    }

    fn restore_facts(&self, _cap: &SyntheticWrite, facts: Vec<Fact>) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.restore"))?;
        if let Some(dup) = facts.iter().find(|f| state.by_id.contains_key(&f.id)) {
            return Err(StorageError::DuplicateKey(dup.id.to_string()));
        }
        for fact in facts {
            state.push(fact)?;
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.len"))?;
        Ok(state.order.len())
    }
}

#[derive(Debug, Default)]
struct InventoryState {
    order: Vec<ItemId>,
    by_id: HashMap<ItemId, InventoryItem>,
    // Active items only.
    by_fingerprint: HashMap<String, ItemId>,
}

impl InventoryState {
    fn push(&mut self, item: InventoryItem) -> Result<(), StorageError> {
        if self.by_id.contains_key(&item.id) {
            return Err(StorageError::DuplicateKey(item.id.to_string()));
        }
        if item.is_active() {
            if let Some(existing) = self.by_fingerprint.get(&item.fingerprint) {
                return Err(StorageError::DuplicateKey(format!(
                    "fingerprint {} already held by {existing}",
                    item.fingerprint
                )));
            }
            self.by_fingerprint.insert(item.fingerprint.clone(), item.id.clone());
        }
        self.order.push(item.id.clone());
        self.by_id.insert(item.id.clone(), item);
        Ok(())
    }

    fn item_mut(&mut self, id: &ItemId) -> Result<&mut InventoryItem, StorageError> {
        self.by_id
            .get_mut(id)
            .ok_or_else(|| StorageError::ItemNotFound(id.clone()))
    }
}

/// Thread-safe in-memory inventory with fingerprint dedup.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<InventoryState>,
}

impl InMemoryInventoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from stored items, preserving order and fact references.
    ///
    /// # Errors
    /// Returns `StorageError::DuplicateKey` on a repeated id or two active
    /// items with the same fingerprint.
    pub fn from_items(items: Vec<InventoryItem>) -> Result<Self, StorageError> {
        let mut state = InventoryState::default();
        for item in items {
            state.push(item)?;
        }
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn add_item(&self, item: NewItem) -> Result<ItemId, StorageError> {
        let fingerprint = item.fingerprint()?;
        let mut state = self.state.write().map_err(|_| lock_err("item.add"))?;
        if let Some(existing) = state.by_fingerprint.get(&fingerprint) {
            return Ok(existing.clone());
        }
        let item = item.into_item(fingerprint);
        let id = item.id.clone();
        state.push(item)?;
        Ok(id)
    }

    fn get_item(&self, id: &ItemId) -> Result<Option<InventoryItem>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("item.get"))?;
        Ok(state.by_id.get(id).cloned())
    }

    fn get_items(&self, filter: &ItemFilter) -> Result<Vec<InventoryItem>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("item.get_items"))?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.by_id.get(id))
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }

    fn attach_fact(&self, _cap: &LinkWrite, id: &ItemId, fact_id: &FactId) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("item.attach_fact"))?;
        let item = state.item_mut(id)?;
        if item.references(fact_id) {
            return Ok(false);
        }
        item.source_fact_ids.push(fact_id.clone());
        Ok(true)
    }

    fn detach_fact(&self, _cap: &LinkWrite, id: &ItemId, fact_id: &FactId) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("item.detach_fact"))?;
        let item = state.item_mut(id)?;
        let before = item.source_fact_ids.len();
        item.source_fact_ids.retain(|f| f != fact_id);
        Ok(item.source_fact_ids.len() != before)
    }

    fn remove_item(&self, id: &ItemId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("item.remove"))?;
        let item = state.item_mut(id)?;
        if item.status == ItemStatus::Removed {
            return Ok(());
        }
        item.status = ItemStatus::Removed;
        let fingerprint = item.fingerprint.clone();
        if state.by_fingerprint.get(&fingerprint) == Some(id) {
            state.by_fingerprint.remove(&fingerprint);
        }
        Ok(())
    }

    fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("item.len"))?;
        Ok(state.order.len())
    }
}
