//! Fact → inventory projection and bidirectional reference maintenance.
//!
//! The linker is the only component (besides the assumption lifecycle, which
//! goes through it) that writes `Fact::inventory_item_id` and
//! `InventoryItem::source_fact_ids`. Both directions are written together or
//! not at all.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attributes::DataSource;
use crate::error::LinkingDegradation;
use crate::fact::{Fact, FactFilter, NewFact};
use crate::ids::{FactId, ItemId};
use crate::inventory::{InventoryItem, InventoryType, ItemFilter, NewItem, SourceType};
use crate::storage::{FactStore, InventoryStore, LinkWrite, StorageError};

/// Links facts to inventory items through explicitly injected stores.
#[derive(Clone)]
pub struct Linker {
    facts: Arc<dyn FactStore>,
    inventory: Arc<dyn InventoryStore>,
}

impl std::fmt::Debug for Linker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linker").finish_non_exhaustive()
    }
}

impl Linker {
    /// Creates a linker over the given stores.
    #[must_use]
    pub fn new(facts: Arc<dyn FactStore>, inventory: Arc<dyn InventoryStore>) -> Self {
        Self { facts, inventory }
    }

    /// Fact store handle.
    #[must_use]
    pub fn facts(&self) -> &Arc<dyn FactStore> {
        &self.facts
    }

    /// Inventory store handle.
    #[must_use]
    pub fn inventory(&self) -> &Arc<dyn InventoryStore> {
        &self.inventory
    }

    /// Appends a fact and, when `link` is set, projects it into the inventory.
    ///
    /// Validation failures are returned. A failed projection is logged and
    /// absorbed: the fact persists unlinked.
    ///
    /// # Errors
    /// Returns the store's error if the fact itself is rejected.
    pub fn ingest(&self, fact: NewFact, link: bool) -> Result<FactId, StorageError> {
        let fact_id = self.facts.add_fact(fact)?;
        if !link {
            return Ok(fact_id);
        }
        match self.link_by_id(&fact_id) {
            Ok(item_id) => {
                tracing::debug!(fact_id = %fact_id, item_id = %item_id, "ingested and linked fact");
            }
            Err(degradation) => {
                tracing::warn!(fact_id = %fact_id, error = %degradation, "fact persisted unlinked");
            }
        }
        Ok(fact_id)
    }

    /// Projects a stored fact into the inventory by id.
    ///
    /// # Errors
    /// Returns `LinkingDegradation` if the fact is missing or cannot be projected.
    pub fn link_by_id(&self, fact_id: &FactId) -> Result<ItemId, LinkingDegradation> {
        let fact = self
            .facts
            .get_fact(fact_id)
            .map_err(|source| storage_degradation(fact_id, None, source))?
            .ok_or_else(|| {
                storage_degradation(fact_id, None, StorageError::FactNotFound(fact_id.clone()))
            })?;
        self.link(&fact)
    }

    /// Derives inventory attributes from the fact, adds (or finds) the item and
    /// writes both references.
    ///
    /// Linking the same fact twice is a no-op that returns the same item id.
    ///
    /// # Errors
    /// Returns `LinkingDegradation` if the domain has no inventory type, the
    /// derived item is invalid, or a store write fails.
    pub fn link(&self, fact: &Fact) -> Result<ItemId, LinkingDegradation> {
        let inventory_type = InventoryType::for_domain(&fact.domain).ok_or_else(|| {
            LinkingDegradation::UnsupportedDomain {
                fact_id: fact.id.clone(),
                domain: fact.domain.clone(),
            }
        })?;

        let item = project(fact, inventory_type);
        let item_id = self.inventory.add_item(item).map_err(|e| match e {
            StorageError::Invalid(source) => LinkingDegradation::Invalid {
                fact_id: fact.id.clone(),
                source,
            },
            other => storage_degradation(&fact.id, None, other),
        })?;

        self.bind(fact, &item_id)?;
        Ok(item_id)
    }

    /// Links a fact to a specific existing item after checking scope.
    ///
    /// # Errors
    /// Returns `LinkingDegradation::ScopeMismatch` if deal or entity differ,
    /// or a storage degradation if the item is missing.
    pub fn link_to_item(&self, fact: &Fact, item_id: &ItemId) -> Result<(), LinkingDegradation> {
        let item = self
            .inventory
            .get_item(item_id)
            .map_err(|e| storage_degradation(&fact.id, Some(item_id), e))?
            .ok_or_else(|| {
                storage_degradation(&fact.id, Some(item_id), StorageError::ItemNotFound(item_id.clone()))
            })?;
        if item.deal_id != fact.deal_id || item.entity != fact.entity {
            return Err(LinkingDegradation::ScopeMismatch {
                fact_id: fact.id.clone(),
                item_id: item_id.clone(),
            });
        }
        self.bind(fact, item_id)
    }

    /// Removes both directions of a fact's link. Returns the item it was linked to.
    ///
    /// # Errors
    /// Returns a storage error if either store write fails; the back-reference
    /// is put back if the item side cannot be updated.
    pub fn unlink(&self, fact_id: &FactId) -> Result<Option<ItemId>, StorageError> {
        let cap = LinkWrite::new();
        let previous = self.facts.set_inventory_link(&cap, fact_id, None)?;
        if let Some(item_id) = &previous {
            if let Err(e) = self.inventory.detach_fact(&cap, item_id, fact_id) {
                self.facts.set_inventory_link(&cap, fact_id, previous.clone())?;
                return Err(e);
            }
        }
        Ok(previous)
    }

    fn bind(&self, fact: &Fact, item_id: &ItemId) -> Result<(), LinkingDegradation> {
        if let Some(current) = &fact.inventory_item_id {
            if current != item_id {
                self.unlink(&fact.id)
                    .map_err(|e| storage_degradation(&fact.id, Some(current), e))?;
            }
        }

        let cap = LinkWrite::new();
        let attached = self
            .inventory
            .attach_fact(&cap, item_id, &fact.id)
            .map_err(|e| storage_degradation(&fact.id, Some(item_id), e))?;

        if let Err(e) = self.facts.set_inventory_link(&cap, &fact.id, Some(item_id.clone())) {
            if attached {
                if let Err(undo) = self.inventory.detach_fact(&cap, item_id, &fact.id) {
                    tracing::error!(
                        fact_id = %fact.id,
                        item_id = %item_id,
                        error = %undo,
                        "failed to undo item reference after back-reference write failed"
                    );
                }
            }
            return Err(storage_degradation(&fact.id, Some(item_id), e));
        }

        tracing::debug!(fact_id = %fact.id, item_id = %item_id, new_ref = attached, "linked fact");
        Ok(())
    }
}

fn project(fact: &Fact, inventory_type: InventoryType) -> NewItem {
    let mut data = fact.details.clone();
    data.name = Some(fact.display_name().to_string());

    let source_type = match fact.details.data_source {
        Some(DataSource::Assumed) => SourceType::Assumed,
        Some(DataSource::Imported) => SourceType::Imported,
        Some(DataSource::Extracted) | None => SourceType::Extracted,
    };

    NewItem {
        inventory_type,
        entity: fact.entity,
        deal_id: fact.deal_id.clone(),
        data,
        source_file: fact.source_document.clone(),
        source_type,
    }
}

fn storage_degradation(fact_id: &FactId, item_id: Option<&ItemId>, source: StorageError) -> LinkingDegradation {
    LinkingDegradation::Storage {
        fact_id: fact_id.clone(),
        item_id: item_id.cloned(),
        source,
    }
}

/// A violation of the fact ↔ item reference invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkIssue {
    /// Fact points at an item that does not exist.
    DanglingFactLink { fact_id: FactId, item_id: ItemId },
    /// Fact points at an item that does not list it back.
    MissingItemRef { fact_id: FactId, item_id: ItemId },
    /// Item lists a fact that does not point back (or does not exist).
    MissingFactLink { item_id: ItemId, fact_id: FactId },
    /// Linked pair with different deal or entity.
    ScopeMismatch { fact_id: FactId, item_id: ItemId },
}

/// Checks referential symmetry and scope agreement across both stores.
///
/// # Errors
/// Returns a storage error if either store cannot be read.
pub fn audit_links(
    facts: &dyn FactStore,
    inventory: &dyn InventoryStore,
) -> Result<Vec<LinkIssue>, StorageError> {
    let all_facts = facts.get_facts(&FactFilter::default())?;
    let all_items = inventory.get_items(&ItemFilter {
        include_removed: true,
        ..ItemFilter::default()
    })?;

    let fact_by_id: HashMap<&FactId, &Fact> = all_facts.iter().map(|f| (&f.id, f)).collect();
    let item_by_id: HashMap<&ItemId, &InventoryItem> = all_items.iter().map(|i| (&i.id, i)).collect();
    let mut issues = Vec::new();

    for fact in &all_facts {
        let Some(item_id) = &fact.inventory_item_id else {
            continue;
        };
        match item_by_id.get(item_id) {
            None => issues.push(LinkIssue::DanglingFactLink {
                fact_id: fact.id.clone(),
                item_id: item_id.clone(),
            }),
            Some(item) => {
                if !item.references(&fact.id) {
                    issues.push(LinkIssue::MissingItemRef {
                        fact_id: fact.id.clone(),
                        item_id: item_id.clone(),
                    });
                }
                if item.deal_id != fact.deal_id || item.entity != fact.entity {
                    issues.push(LinkIssue::ScopeMismatch {
                        fact_id: fact.id.clone(),
                        item_id: item_id.clone(),
                    });
                }
            }
        }
    }

    for item in &all_items {
        for fact_id in &item.source_fact_ids {
            let points_back = fact_by_id
                .get(fact_id)
                .is_some_and(|f| f.inventory_item_id.as_ref() == Some(&item.id));
            if !points_back {
                issues.push(LinkIssue::MissingFactLink {
                    item_id: item.id.clone(),
                    fact_id: fact_id.clone(),
                });
            }
        }
    }

    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::scope::Scope;
    use crate::storage::{InMemoryFactStore, InMemoryInventoryStore};

    fn linker() -> Linker {
        Linker::new(Arc::new(InMemoryFactStore::new()), Arc::new(InMemoryInventoryStore::new()))
    }

    fn target() -> Scope {
        Scope::parse("D1", "target").unwrap()
    }

    fn assert_clean(linker: &Linker) {
        let issues = audit_links(linker.facts().as_ref(), linker.inventory().as_ref()).unwrap();
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn link_writes_both_directions() {
        let linker = linker();
        let fact_id = linker
            .ingest(NewFact::new(&target(), "applications", "erp", "SAP ECC"), false)
            .unwrap();
        let item_id = linker.link_by_id(&fact_id).unwrap();

        let fact = linker.facts().get_fact(&fact_id).unwrap().unwrap();
        let item = linker.inventory().get_item(&item_id).unwrap().unwrap();
        assert_eq!(fact.inventory_item_id.as_ref(), Some(&item_id));
        assert_eq!(item.source_fact_ids, vec![fact_id]);
        assert_eq!(item.name(), "SAP ECC");
        assert_eq!(item.source_type, SourceType::Extracted);
        assert_clean(&linker);
    }

    #[test]
    fn relinking_is_idempotent() {
        let linker = linker();
        let fact_id = linker
            .ingest(NewFact::new(&target(), "applications", "erp", "SAP ECC"), true)
            .unwrap();
        let first = linker.link_by_id(&fact_id).unwrap();
        let second = linker.link_by_id(&fact_id).unwrap();
        assert_eq!(first, second);
        let item = linker.inventory().get_item(&first).unwrap().unwrap();
        assert_eq!(item.source_fact_ids.len(), 1);
        assert_eq!(linker.inventory().len().unwrap(), 1);
    }

    #[test]
    fn facts_with_same_name_share_one_item() {
        let linker = linker();
        let a = linker
            .ingest(NewFact::new(&target(), "applications", "erp", "SAP ECC"), true)
            .unwrap();
        let b = linker
            .ingest(NewFact::new(&target(), "applications", "erp", "sap ecc"), true)
            .unwrap();
        let items = linker.inventory().get_items(&ItemFilter::scope(&target())).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].source_fact_ids, vec![a, b]);
        assert_clean(&linker);
    }

    #[test]
    fn unsupported_domain_degrades_without_failing_ingest() {
        let linker = linker();
        let fact_id = linker
            .ingest(NewFact::new(&target(), "cybersecurity", "controls", "MFA"), true)
            .unwrap();
        let fact = linker.facts().get_fact(&fact_id).unwrap().unwrap();
        assert!(!fact.is_linked());
        assert!(linker.inventory().is_empty().unwrap());

        let err = linker.link(&fact).unwrap_err();
        assert!(matches!(err, LinkingDegradation::UnsupportedDomain { .. }));
    }

    #[test]
    fn link_to_item_rejects_cross_entity() {
        let linker = linker();
        let buyer = Scope::parse("D1", "buyer").unwrap();
        let item_id = linker
            .inventory()
            .add_item(NewItem::new(&buyer, InventoryType::Application, Attributes::new().with_name("SAP ECC"), SourceType::Imported))
            .unwrap();
        let fact_id = linker
            .ingest(NewFact::new(&target(), "applications", "erp", "SAP ECC"), false)
            .unwrap();
        let fact = linker.facts().get_fact(&fact_id).unwrap().unwrap();

        let err = linker.link_to_item(&fact, &item_id).unwrap_err();
        assert!(matches!(err, LinkingDegradation::ScopeMismatch { .. }));
        assert_clean(&linker);
    }

    #[test]
    fn unlink_clears_both_directions() {
        let linker = linker();
        let fact_id = linker
            .ingest(NewFact::new(&target(), "infrastructure", "hosting", "AWS"), true)
            .unwrap();
        let item_id = linker.unlink(&fact_id).unwrap().unwrap();
        let item = linker.inventory().get_item(&item_id).unwrap().unwrap();
        assert!(item.source_fact_ids.is_empty());
        assert!(!linker.facts().get_fact(&fact_id).unwrap().unwrap().is_linked());
        assert_eq!(linker.unlink(&fact_id).unwrap(), None);
    }

    #[test]
    fn audit_reports_one_sided_links() {
        let linker = linker();
        let fact_id = linker
            .ingest(NewFact::new(&target(), "applications", "erp", "SAP"), true)
            .unwrap();
        let item_id = linker.facts().get_fact(&fact_id).unwrap().unwrap().inventory_item_id.unwrap();
        linker.inventory().detach_fact(&LinkWrite::new(), &item_id, &fact_id).unwrap();

        let issues = audit_links(linker.facts().as_ref(), linker.inventory().as_ref()).unwrap();
        assert_eq!(issues, vec![LinkIssue::MissingItemRef { fact_id, item_id }]);
    }
}
