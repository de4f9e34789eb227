//! Retroactive fact ↔ item matching for records created through independent paths.
//!
//! Within one (deal, entity) scope and inventory type, unlinked facts are
//! compared against items that have no fact references. Each fact, in
//! first-seen order, takes its best-scoring item if the score clears the
//! threshold; ties go to the first-seen item. Cost is O(facts × items) per
//! scope, which is acceptable below a couple of thousand records.

pub mod scoring;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

pub use scoring::{name_similarity, MatchScorer, WeightedNameScorer};

use crate::error::ValidationError;
use crate::fact::FactFilter;
use crate::ids::{FactId, ItemId};
use crate::inventory::{InventoryType, ItemFilter};
use crate::linking::Linker;
use crate::scope::{DealId, Entity, Scope};
use crate::storage::StorageError;

/// Reconciliation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Minimum score for a match.
    pub threshold: f64,
    /// Weight of name similarity.
    pub name_weight: f64,
    /// Weight of vendor similarity; the two weights sum to 1.
    pub vendor_weight: f64,
    /// When set, a matched item is claimed and unavailable to later facts.
    pub exclusive_items: bool,
    /// Wall-clock budget per call; partial results are returned when exceeded.
    pub deadline_ms: Option<u64>,
    /// Scope size above which a warning suggests bucket indexing.
    pub bucket_warn_threshold: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            name_weight: 0.7,
            vendor_weight: 0.3,
            exclusive_items: false,
            deadline_ms: None,
            bucket_warn_threshold: 2000,
        }
    }
}

impl ReconcileConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidConfig {
            reason: reason.to_string(),
        };
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(invalid("reconcile.threshold must be in (0, 1]"));
        }
        if !self.name_weight.is_finite() || !self.vendor_weight.is_finite() {
            return Err(invalid("reconcile weights must be finite"));
        }
        if self.name_weight < 0.0 || self.vendor_weight < 0.0 {
            return Err(invalid("reconcile weights must be non-negative"));
        }
        if ((self.name_weight + self.vendor_weight) - 1.0).abs() > 1e-9 {
            return Err(invalid("reconcile weights must sum to 1"));
        }
        if self.deadline_ms == Some(0) {
            return Err(invalid("reconcile.deadline_ms must be > 0"));
        }
        Ok(())
    }

    /// The default scorer with these weights.
    #[must_use]
    pub fn scorer(&self) -> WeightedNameScorer {
        WeightedNameScorer {
            name_weight: self.name_weight,
            vendor_weight: self.vendor_weight,
        }
    }
}

/// One fact linked to one item by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileMatch {
    /// Linked fact.
    pub fact_id: FactId,
    /// Item it was linked to.
    pub item_id: ItemId,
    /// Score that cleared the threshold.
    pub score: f64,
}

/// Outcome of one reconciliation pass. Unmatched records are counted, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Scope that was reconciled.
    pub scope: Scope,
    /// Links made in this pass, in fact order.
    pub linked: Vec<ReconcileMatch>,
    /// Unlinked facts left without a match, including any not reached before the deadline.
    pub unmatched_facts: usize,
    /// Candidate items that received no fact in this pass.
    pub unmatched_items: usize,
    /// Unlinked facts whose domain has no inventory type.
    pub skipped_facts: usize,
    /// The deadline passed; results are partial.
    pub timed_out: bool,
}

impl ReconcileReport {
    fn empty(scope: Scope) -> Self {
        Self {
            scope,
            linked: Vec::new(),
            unmatched_facts: 0,
            unmatched_items: 0,
            skipped_facts: 0,
            timed_out: false,
        }
    }
}

/// Matches unlinked facts to unreferenced items and links them through the [`Linker`].
pub struct Reconciler {
    linker: Linker,
    scorer: Box<dyn MatchScorer>,
    config: ReconcileConfig,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler using the weighted name scorer from `config`.
    #[must_use]
    pub fn new(linker: Linker, config: ReconcileConfig) -> Self {
        let scorer = Box::new(config.scorer());
        Self {
            linker,
            scorer,
            config,
        }
    }

    /// Replaces the scoring function.
    #[must_use]
    pub fn with_scorer(mut self, scorer: impl MatchScorer + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Reconciles one scope using the configured deadline.
    ///
    /// # Errors
    /// Returns a storage error if a store cannot be read.
    pub fn reconcile(&self, scope: &Scope) -> Result<ReconcileReport, StorageError> {
        let deadline = self
            .config
            .deadline_ms
            .and_then(|ms| Instant::now().checked_add(Duration::from_millis(ms)));
        self.reconcile_until(scope, deadline)
    }

    /// Reconciles both sides of a deal, target first.
    ///
    /// # Errors
    /// Returns a storage error if a store cannot be read.
    pub fn reconcile_deal(&self, deal_id: &DealId) -> Result<Vec<ReconcileReport>, StorageError> {
        Entity::ALL
            .into_iter()
            .map(|entity| self.reconcile(&Scope::new(deal_id.clone(), entity)))
            .collect()
    }

    /// Reconciles one scope, stopping with partial results once `deadline` passes.
    ///
    /// # Errors
    /// Returns a storage error if a store cannot be read.
    pub fn reconcile_until(
        &self,
        scope: &Scope,
        deadline: Option<Instant>,
    ) -> Result<ReconcileReport, StorageError> {
        let mut report = ReconcileReport::empty(scope.clone());
        let facts = self
            .linker
            .facts()
            .get_facts(&FactFilter::scope(scope).unlinked())?;

        for inventory_type in InventoryType::ALL {
            let typed: Vec<_> = facts
                .iter()
                .filter(|f| InventoryType::for_domain(&f.domain) == Some(inventory_type))
                .collect();
            let items = self
                .linker
                .inventory()
                .get_items(&ItemFilter::scope(scope).inventory_type(inventory_type).unlinked())?;
            if report.timed_out || typed.is_empty() || items.is_empty() {
                report.unmatched_facts += typed.len();
                report.unmatched_items += items.len();
                continue;
            }

            if typed.len() > self.config.bucket_warn_threshold || items.len() > self.config.bucket_warn_threshold {
                tracing::warn!(
                    scope = %scope,
                    inventory_type = %inventory_type,
                    facts = typed.len(),
                    items = items.len(),
                    "reconciliation scope is large; consider bucketing by normalized first token"
                );
            }

            let mut claimed: HashSet<usize> = HashSet::new();
            let mut used: HashSet<usize> = HashSet::new();

            for (processed, fact) in typed.iter().enumerate() {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    report.timed_out = true;
                    report.unmatched_facts += typed.len() - processed;
                    break;
                }

                let mut best: Option<(usize, f64)> = None;
                for (idx, item) in items.iter().enumerate() {
                    if self.config.exclusive_items && claimed.contains(&idx) {
                        continue;
                    }
                    let score = self.scorer.score(fact, item);
                    if best.map_or(true, |(_, b)| score > b) {
                        best = Some((idx, score));
                    }
                }

                let Some((idx, score)) = best.filter(|(_, s)| *s >= self.config.threshold) else {
                    report.unmatched_facts += 1;
                    continue;
                };

                let item = &items[idx];
                match self.linker.link_to_item(fact, &item.id) {
                    Ok(()) => {
                        tracing::debug!(
                            fact_id = %fact.id,
                            item_id = %item.id,
                            score,
                            "reconciled fact"
                        );
                        claimed.insert(idx);
                        used.insert(idx);
                        report.linked.push(ReconcileMatch {
                            fact_id: fact.id.clone(),
                            item_id: item.id.clone(),
                            score,
                        });
                    }
                    Err(degradation) => {
                        tracing::warn!(fact_id = %fact.id, error = %degradation, "reconciliation link failed");
                        report.unmatched_facts += 1;
                    }
                }
            }

            report.unmatched_items += items.len() - used.len();
        }

        report.skipped_facts = facts
            .iter()
            .filter(|f| InventoryType::for_domain(&f.domain).is_none())
            .count();

        if report.timed_out {
            tracing::warn!(scope = %scope, linked = report.linked.len(), "reconciliation deadline reached; returning partial results");
        } else {
            tracing::info!(
                scope = %scope,
                linked = report.linked.len(),
                unmatched_facts = report.unmatched_facts,
                unmatched_items = report.unmatched_items,
                "reconciliation complete"
            );
        }
        Ok(report)
    }
}
