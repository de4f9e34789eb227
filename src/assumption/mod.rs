//! Assumption lifecycle: generate, purge and atomically replace synthetic facts.
//!
//! Each (deal, entity) scope moves `ObservedOnly → Generating → Merged` and
//! re-enters on every detection re-run. A run snapshots the scope's live
//! synthetic facts, purges them, asks the producer for candidates, drops
//! repeated `category + item` keys, merges the survivors and links them into
//! the inventory. Any failure after the snapshot removes what the run added and
//! restores the snapshot, so the scope ends with either its previous synthetic
//! set or the complete new one.
//!
//! Every purge and merge predicate is scoped by (deal, entity): target and
//! buyer runs against one shared store never touch each other's facts.

mod producer;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

pub use producer::{AssumptionProducer, CandidateFact, DetectionSignal, DetectionStatus, ScopeContext};

use crate::attributes::DataSource;
use crate::error::{LifecycleFailure, LinkingDegradation, ProducerError, ValidationError};
use crate::fact::{Fact, FactFilter, NewFact};
use crate::ids::{normalize_key, FactId};
use crate::inventory::{ItemFilter, SourceType};
use crate::linking::Linker;
use crate::scope::Scope;
use crate::storage::{LinkWrite, StorageError, SyntheticWrite};

/// Lifecycle position of one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No synthetic facts have been merged for the scope.
    #[default]
    ObservedOnly,
    /// A run is in progress.
    Generating,
    /// The latest run committed.
    Merged,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObservedOnly => write!(f, "observed_only"),
            Self::Generating => write!(f, "generating"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// When the lifecycle runs at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Minimum detector confidence required to act on a signal.
    pub min_confidence: f64,
    /// Also run on `PARTIAL` detections, not only `MISSING`.
    pub run_on_partial: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            run_on_partial: true,
        }
    }
}

impl LifecycleConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.min_confidence.is_finite() || !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ValidationError::InvalidConfig {
                reason: "lifecycle.min_confidence must be in [0, 1]".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the reason a signal does not warrant a run, if any.
    #[must_use]
    pub fn skip_reason(&self, signal: &DetectionSignal) -> Option<SkipReason> {
        match signal.status {
            DetectionStatus::Full => return Some(SkipReason::DataPresent),
            DetectionStatus::Partial if !self.run_on_partial => return Some(SkipReason::DataPresent),
            DetectionStatus::Partial | DetectionStatus::Missing => {}
        }
        if !signal.has_valid_confidence() || signal.confidence < self.min_confidence {
            return Some(SkipReason::LowConfidence);
        }
        None
    }
}

/// Why a detection signal did not trigger a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The detector found enough observed data.
    DataPresent,
    /// The detector was not confident enough to act on.
    LowConfidence,
}

/// Summary of a committed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleReport {
    /// Scope the run applied to.
    pub scope: Scope,
    /// Prior synthetic facts removed.
    pub purged: usize,
    /// Synthetic facts added, in producer order.
    pub added: Vec<FactId>,
    /// Candidates dropped for repeating a `category + item` key.
    pub duplicates_dropped: usize,
    /// Added facts that could not be projected into the inventory.
    pub unlinked: usize,
    /// Orphaned synthetic inventory items soft-deleted at commit.
    pub items_retired: usize,
}

/// Result of [`AssumptionManager::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LifecycleOutcome {
    /// The signal did not warrant a run; nothing changed.
    Skipped { reason: SkipReason },
    /// The run committed.
    Merged(LifecycleReport),
}

impl LifecycleOutcome {
    /// True if the run committed.
    #[must_use]
    pub fn is_merged(&self) -> bool {
        matches!(self, Self::Merged(_))
    }
}

enum RunError {
    Producer(ProducerError),
    Merge(String),
    Storage(StorageError),
}

impl From<StorageError> for RunError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

/// Drives the generate/purge/replace cycle for synthetic facts.
pub struct AssumptionManager {
    linker: Linker,
    producer: Box<dyn AssumptionProducer>,
    config: LifecycleConfig,
    states: RwLock<HashMap<Scope, LifecycleState>>,
}

impl fmt::Debug for AssumptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssumptionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AssumptionManager {
    /// Creates a manager over the linker's stores.
    #[must_use]
    pub fn new(linker: Linker, producer: impl AssumptionProducer + 'static, config: LifecycleConfig) -> Self {
        Self {
            linker,
            producer: Box::new(producer),
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Gate configuration.
    #[must_use]
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Current lifecycle state of a scope.
    #[must_use]
    pub fn state(&self, scope: &Scope) -> LifecycleState {
        self.states
            .read()
            .map(|s| s.get(scope).copied().unwrap_or_default())
            .unwrap_or_default()
    }

    fn set_state(&self, scope: &Scope, state: LifecycleState) {
        match self.states.write() {
            Ok(mut states) => {
                states.insert(scope.clone(), state);
            }
            Err(_) => tracing::error!(scope = %scope, "lifecycle state lock poisoned"),
        }
    }

    /// Live synthetic facts of a scope.
    ///
    /// # Errors
    /// Returns a storage error if the fact store cannot be read.
    pub fn synthetic_facts(&self, scope: &Scope) -> Result<Vec<Fact>, StorageError> {
        self.linker
            .facts()
            .get_facts(&FactFilter::scope(scope).data_source(DataSource::Assumed))
    }

    /// Runs one detection-triggered cycle for `scope`.
    ///
    /// # Errors
    /// Returns `LifecycleFailure` if generation or merge failed. The scope's
    /// synthetic facts have been restored to their pre-run state; the caller
    /// should continue with observed data only.
    pub fn run(&self, scope: &Scope, signal: &DetectionSignal) -> Result<LifecycleOutcome, LifecycleFailure> {
        if let Some(reason) = self.config.skip_reason(signal) {
            tracing::debug!(scope = %scope, status = %signal.status, ?reason, "assumption run skipped");
            return Ok(LifecycleOutcome::Skipped { reason });
        }

        let prior_state = self.state(scope);
        let snapshot = self.synthetic_facts(scope).map_err(|source| LifecycleFailure::Storage {
            scope: scope.to_string(),
            restored: 0,
            source,
        })?;

        self.set_state(scope, LifecycleState::Generating);
        tracing::info!(scope = %scope, status = %signal.status, prior = snapshot.len(), "assumption run started");

        match self.replace(scope, signal, &snapshot) {
            Ok(mut report) => {
                report.items_retired = self.retire_orphans(scope);
                self.set_state(scope, LifecycleState::Merged);
                tracing::info!(
                    scope = %scope,
                    purged = report.purged,
                    added = report.added.len(),
                    dropped = report.duplicates_dropped,
                    "assumption run merged"
                );
                Ok(LifecycleOutcome::Merged(report))
            }
            Err(err) => {
                let restored = self.rollback(scope, &snapshot);
                self.set_state(scope, prior_state);
                let scope_name = scope.to_string();
                let failure = match err {
                    RunError::Producer(source) => LifecycleFailure::Generation {
                        scope: scope_name,
                        restored,
                        source,
                    },
                    RunError::Merge(reason) => LifecycleFailure::Merge {
                        scope: scope_name,
                        restored,
                        reason,
                    },
                    RunError::Storage(source) => LifecycleFailure::Storage {
                        scope: scope_name,
                        restored,
                        source,
                    },
                };
                tracing::warn!(scope = %scope, error = %failure, "assumption run rolled back");
                Err(failure)
            }
        }
    }

    // Purge → generate → merge, strictly in that order.
    fn replace(
        &self,
        scope: &Scope,
        signal: &DetectionSignal,
        snapshot: &[Fact],
    ) -> Result<LifecycleReport, RunError> {
        let purged = self.purge(scope, snapshot)?;

        let observed: Vec<Fact> = self
            .linker
            .facts()
            .get_facts(&FactFilter::scope(scope))?
            .into_iter()
            .filter(|f| !f.is_assumed())
            .collect();
        let ctx = ScopeContext {
            scope: scope.clone(),
            signal: *signal,
            observed,
        };
        let candidates = self.producer.produce(&ctx).map_err(RunError::Producer)?;

        let mut seen = HashSet::new();
        let mut duplicates_dropped = 0;
        let mut added = Vec::new();
        let mut unlinked = 0;

        for candidate in candidates {
            let key = (normalize_key(&candidate.category), normalize_key(&candidate.item));
            if !seen.insert(key) {
                duplicates_dropped += 1;
                continue;
            }

            let fact_id = self.merge_one(scope, candidate)?;
            added.push(fact_id.clone());

            match self.linker.link_by_id(&fact_id) {
                Ok(_) => {}
                Err(LinkingDegradation::Storage { source, .. }) => return Err(RunError::Storage(source)),
                Err(degradation) => {
                    tracing::debug!(fact_id = %fact_id, error = %degradation, "synthetic fact left unlinked");
                    unlinked += 1;
                }
            }
        }

        Ok(LifecycleReport {
            scope: scope.clone(),
            purged,
            added,
            duplicates_dropped,
            unlinked,
            items_retired: 0,
        })
    }

    fn merge_one(&self, scope: &Scope, candidate: CandidateFact) -> Result<FactId, RunError> {
        let mut details = candidate.details;
        details.data_source = Some(DataSource::Assumed);

        let fact = NewFact::new(scope, candidate.domain, candidate.category, candidate.item)
            .details(details)
            .status(candidate.status)
            .evidence(candidate.evidence);
        self.linker.facts().add_fact(fact).map_err(|e| match e {
            StorageError::Invalid(v) => RunError::Merge(format!("invalid candidate: {v}")),
            other => RunError::Storage(other),
        })
    }

    /// Unlinks and removes every synthetic fact of the scope.
    fn purge(&self, scope: &Scope, live: &[Fact]) -> Result<usize, StorageError> {
        for fact in live.iter().filter(|f| f.is_linked()) {
            self.linker.unlink(&fact.id)?;
        }
        let cap = SyntheticWrite::new();
        self.linker
            .facts()
            .remove_facts(&cap, &|f: &Fact| f.in_scope(scope))
    }

    /// Removes whatever the failed run added and puts the snapshot back,
    /// including its inventory references.
    ///
    /// Returns the number of snapshot facts restored with their link intact.
    /// A fact whose item reference cannot be reattached stays in the log but
    /// is left unlinked and is not counted.
    fn rollback(&self, scope: &Scope, snapshot: &[Fact]) -> usize {
        let current = match self.synthetic_facts(scope) {
            Ok(facts) => facts,
            Err(e) => {
                tracing::error!(scope = %scope, error = %e, "rollback could not read synthetic facts");
                Vec::new()
            }
        };
        if let Err(e) = self.purge(scope, &current) {
            tracing::error!(scope = %scope, error = %e, "rollback purge failed");
        }

        if let Err(e) = self.linker.facts().restore_facts(&SyntheticWrite::new(), snapshot.to_vec()) {
            tracing::error!(scope = %scope, error = %e, "rollback could not restore snapshot");
            return 0;
        }

        let cap = LinkWrite::new();
        let mut restored = 0;
        for fact in snapshot {
            let Some(item_id) = &fact.inventory_item_id else {
                restored += 1;
                continue;
            };
            match self.linker.inventory().attach_fact(&cap, item_id, &fact.id) {
                Ok(_) => restored += 1,
                Err(e) => {
                    tracing::error!(fact_id = %fact.id, item_id = %item_id, error = %e, "rollback could not restore item reference");
                    if let Err(e) = self.linker.facts().set_inventory_link(&cap, &fact.id, None) {
                        tracing::error!(fact_id = %fact.id, error = %e, "rollback could not clear back-reference");
                    }
                }
            }
        }
        self.retire_orphans(scope);
        restored
    }

    /// Soft-deletes synthetic inventory items in the scope left with no fact references.
    fn retire_orphans(&self, scope: &Scope) -> usize {
        let orphans = match self.linker.inventory().get_items(&ItemFilter::scope(scope).unlinked()) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(scope = %scope, error = %e, "could not list inventory for orphan sweep");
                return 0;
            }
        };
        let mut retired = 0;
        for item in orphans.iter().filter(|i| i.source_type == SourceType::Assumed) {
            match self.linker.inventory().remove_item(&item.id) {
                Ok(()) => retired += 1,
                Err(e) => {
                    tracing::warn!(item_id = %item.id, error = %e, "could not retire orphaned synthetic item");
                }
            }
        }
        retired
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::ids::ItemId;
    use crate::inventory::{InventoryItem, NewItem};
    use crate::linking::audit_links;
    use crate::storage::{InMemoryFactStore, InMemoryInventoryStore, InventoryStore};

    /// Inventory whose `attach_fact` can be switched to fail.
    #[derive(Default)]
    struct FlakyInventory {
        inner: InMemoryInventoryStore,
        fail_attach: AtomicBool,
    }

    impl InventoryStore for FlakyInventory {
        fn add_item(&self, item: NewItem) -> Result<ItemId, StorageError> {
            self.inner.add_item(item)
        }

        fn get_item(&self, id: &ItemId) -> Result<Option<InventoryItem>, StorageError> {
            self.inner.get_item(id)
        }

        fn get_items(&self, filter: &ItemFilter) -> Result<Vec<InventoryItem>, StorageError> {
            self.inner.get_items(filter)
        }

        fn attach_fact(&self, cap: &LinkWrite, id: &ItemId, fact_id: &FactId) -> Result<bool, StorageError> {
            if self.fail_attach.load(Ordering::SeqCst) {
                return Err(StorageError::BackendError("attach unavailable".to_string()));
            }
            self.inner.attach_fact(cap, id, fact_id)
        }

        fn detach_fact(&self, cap: &LinkWrite, id: &ItemId, fact_id: &FactId) -> Result<bool, StorageError> {
            self.inner.detach_fact(cap, id, fact_id)
        }

        fn remove_item(&self, id: &ItemId) -> Result<(), StorageError> {
            self.inner.remove_item(id)
        }

        fn len(&self) -> Result<usize, StorageError> {
            self.inner.len()
        }
    }

    fn linker() -> Linker {
        Linker::new(Arc::new(InMemoryFactStore::new()), Arc::new(InMemoryInventoryStore::new()))
    }

    fn target() -> Scope {
        Scope::parse("D1", "target").unwrap()
    }

    fn fixed(names: &'static [&'static str]) -> impl Fn(&ScopeContext) -> Result<Vec<CandidateFact>, ProducerError> {
        move |_ctx: &ScopeContext| {
            Ok(names
                .iter()
                .map(|n| CandidateFact::new("applications", "assumed_app", *n))
                .collect())
        }
    }

    #[test]
    fn full_detection_skips() {
        let manager = AssumptionManager::new(linker(), fixed(&["ERP"]), LifecycleConfig::default());
        let outcome = manager.run(&target(), &DetectionSignal::full(0.9).unwrap()).unwrap();
        assert_eq!(outcome, LifecycleOutcome::Skipped { reason: SkipReason::DataPresent });
        assert_eq!(manager.state(&target()), LifecycleState::ObservedOnly);
    }

    #[test]
    fn low_confidence_skips() {
        let config = LifecycleConfig {
            min_confidence: 0.7,
            ..LifecycleConfig::default()
        };
        let manager = AssumptionManager::new(linker(), fixed(&["ERP"]), config);
        let outcome = manager.run(&target(), &DetectionSignal::missing(0.5).unwrap()).unwrap();
        assert_eq!(outcome, LifecycleOutcome::Skipped { reason: SkipReason::LowConfidence });
    }

    #[test]
    fn partial_respects_config() {
        let config = LifecycleConfig {
            run_on_partial: false,
            ..LifecycleConfig::default()
        };
        let manager = AssumptionManager::new(linker(), fixed(&["ERP"]), config);
        assert!(!manager.run(&target(), &DetectionSignal::partial(0.9).unwrap()).unwrap().is_merged());
    }

    #[test]
    fn run_tags_links_and_dedups() {
        let manager = AssumptionManager::new(linker(), fixed(&["ERP", "CRM", "erp "]), LifecycleConfig::default());
        let LifecycleOutcome::Merged(report) = manager.run(&target(), &DetectionSignal::missing(0.9).unwrap()).unwrap() else {
            panic!("expected merge");
        };
        assert_eq!(report.added.len(), 2);
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(manager.state(&target()), LifecycleState::Merged);

        let facts = manager.synthetic_facts(&target()).unwrap();
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|f| f.is_assumed() && f.is_linked()));

        let items = manager.linker.inventory().get_items(&ItemFilter::scope(&target())).unwrap();
        assert!(items.iter().all(|i| i.source_type == SourceType::Assumed));
    }

    #[test]
    fn producer_failure_restores_prior_state() {
        let linker = linker();
        let first = AssumptionManager::new(linker.clone(), fixed(&["ERP"]), LifecycleConfig::default());
        first.run(&target(), &DetectionSignal::missing(0.9).unwrap()).unwrap();
        let before = first.synthetic_facts(&target()).unwrap();

        let failing = AssumptionManager::new(
            linker,
            |_: &ScopeContext| -> Result<Vec<CandidateFact>, ProducerError> { Err(ProducerError::new("boom")) },
            LifecycleConfig::default(),
        );
        let err = failing.run(&target(), &DetectionSignal::missing(0.9).unwrap()).unwrap_err();
        assert!(matches!(err, LifecycleFailure::Generation { .. }));
        assert_eq!(err.restored(), 1);
        assert_eq!(failing.synthetic_facts(&target()).unwrap(), before);
        assert_eq!(failing.state(&target()), LifecycleState::ObservedOnly);
    }

    #[test]
    fn observed_facts_are_passed_but_never_purged() {
        let linker = linker();
        linker
            .ingest(NewFact::new(&target(), "applications", "erp", "SAP ECC"), true)
            .unwrap();
        let manager = AssumptionManager::new(
            linker.clone(),
            |ctx: &ScopeContext| -> Result<Vec<CandidateFact>, ProducerError> {
                assert_eq!(ctx.observed.len(), 1);
                Ok(vec![CandidateFact::new("applications", "crm", "CRM platform")])
            },
            LifecycleConfig::default(),
        );
        manager.run(&target(), &DetectionSignal::partial(0.8).unwrap()).unwrap();
        manager.run(&target(), &DetectionSignal::partial(0.8).unwrap()).unwrap();
        assert_eq!(linker.facts().len().unwrap(), 2);
    }

    #[test]
    fn non_finite_confidence_never_passes_the_gate() {
        let config = LifecycleConfig {
            min_confidence: 0.7,
            ..LifecycleConfig::default()
        };
        let manager = AssumptionManager::new(linker(), fixed(&["ERP"]), config);
        for confidence in [f64::NAN, f64::INFINITY, 1.5, -0.2] {
            let signal = DetectionSignal {
                status: DetectionStatus::Missing,
                confidence,
            };
            let outcome = manager.run(&target(), &signal).unwrap();
            assert_eq!(outcome, LifecycleOutcome::Skipped { reason: SkipReason::LowConfidence });
        }
        assert!(manager.synthetic_facts(&target()).unwrap().is_empty());
    }

    #[test]
    fn rollback_counts_only_relinked_facts() {
        let inventory = Arc::new(FlakyInventory::default());
        let linker = Linker::new(Arc::new(InMemoryFactStore::new()), inventory.clone());
        let seed = AssumptionManager::new(linker.clone(), fixed(&["ERP", "CRM"]), LifecycleConfig::default());
        seed.run(&target(), &DetectionSignal::missing(0.9).unwrap()).unwrap();

        inventory.fail_attach.store(true, Ordering::SeqCst);
        let failing = AssumptionManager::new(
            linker.clone(),
            |_: &ScopeContext| -> Result<Vec<CandidateFact>, ProducerError> { Err(ProducerError::new("boom")) },
            LifecycleConfig::default(),
        );
        let err = failing.run(&target(), &DetectionSignal::missing(0.9).unwrap()).unwrap_err();
        assert_eq!(err.restored(), 0);

        let facts = failing.synthetic_facts(&target()).unwrap();
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|f| !f.is_linked()));
        assert!(audit_links(linker.facts().as_ref(), linker.inventory().as_ref()).unwrap().is_empty());
    }
}
