//! Deal-level orchestration and outcome reporting.
//!
//! Runs reconciliation and, when a detection signal asks for it, the
//! assumption lifecycle for each scope, then summarizes the result as a
//! [`DealStatus`] so callers do not need to inspect internals.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assumption::{AssumptionManager, AssumptionProducer, DetectionSignal, LifecycleOutcome};
use crate::config::EngineConfig;
use crate::error::ValidationError;
use crate::fact::FactFilter;
use crate::linking::Linker;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::scope::{DealId, Entity, Scope};
use crate::storage::{FactStore, InventoryStore, StorageError};

/// Outcome of analyzing one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    /// Observed data was sufficient; no assumptions were merged.
    Success,
    /// Synthetic facts were merged for this scope.
    SuccessWithAssumptions,
    /// Assumption generation failed and was rolled back; observed data only.
    SuccessFallback,
    /// The scope holds no facts at all.
    NoFacts,
    /// A store failed; see `ScopeReport::message`.
    Error,
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SuccessWithAssumptions => write!(f, "success_with_assumptions"),
            Self::SuccessFallback => write!(f, "success_fallback"),
            Self::NoFacts => write!(f, "no_facts"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Per-scope result of [`DealAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeReport {
    /// Scope that was analyzed.
    pub scope: Scope,
    /// Summary outcome.
    pub status: DealStatus,
    /// Facts in the scope that are not synthetic.
    pub observed_facts: usize,
    /// Live synthetic facts after the run.
    pub synthetic_facts: usize,
    /// Reconciliation pass, absent on error.
    pub reconcile: Option<ReconcileReport>,
    /// Lifecycle outcome, absent when no signal was given or the run failed.
    pub lifecycle: Option<LifecycleOutcome>,
    /// Present when `status` is `error` or `success_fallback`.
    pub message: Option<String>,
}

/// Wires the stores, reconciler and lifecycle manager together.
#[derive(Debug)]
pub struct DealAnalyzer {
    linker: Linker,
    reconciler: Reconciler,
    lifecycle: AssumptionManager,
}

impl DealAnalyzer {
    /// Builds an analyzer over explicit store handles.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidConfig` if `config` does not validate.
    pub fn new(
        facts: Arc<dyn FactStore>,
        inventory: Arc<dyn InventoryStore>,
        producer: impl AssumptionProducer + 'static,
        config: &EngineConfig,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let linker = Linker::new(facts, inventory);
        Ok(Self {
            reconciler: Reconciler::new(linker.clone(), config.reconcile.clone()),
            lifecycle: AssumptionManager::new(linker.clone(), producer, config.lifecycle.clone()),
            linker,
        })
    }

    /// Linker sharing the analyzer's stores.
    #[must_use]
    pub fn linker(&self) -> &Linker {
        &self.linker
    }

    /// Reconciler configured from the engine config.
    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Lifecycle manager configured from the engine config.
    #[must_use]
    pub fn lifecycle(&self) -> &AssumptionManager {
        &self.lifecycle
    }

    /// Analyzes one scope. Never fails: problems are reported through the status.
    pub fn analyze(&self, scope: &Scope, signal: Option<&DetectionSignal>) -> ScopeReport {
        match self.try_analyze(scope, signal) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(scope = %scope, error = %e, "scope analysis failed");
                ScopeReport {
                    scope: scope.clone(),
                    status: DealStatus::Error,
                    observed_facts: 0,
                    synthetic_facts: 0,
                    reconcile: None,
                    lifecycle: None,
                    message: Some(e.to_string()),
                }
            }
        }
    }

    /// Analyzes target then buyer, each with its own detection signal.
    #[must_use]
    pub fn analyze_deal(
        &self,
        deal_id: &DealId,
        signal_for: impl Fn(Entity) -> Option<DetectionSignal>,
    ) -> Vec<ScopeReport> {
        Entity::ALL
            .into_iter()
            .map(|entity| {
                let signal = signal_for(entity);
                self.analyze(&Scope::new(deal_id.clone(), entity), signal.as_ref())
            })
            .collect()
    }

    fn try_analyze(&self, scope: &Scope, signal: Option<&DetectionSignal>) -> Result<ScopeReport, StorageError> {
        let reconcile = self.reconciler.reconcile(scope)?;

        let mut message = None;
        let mut fallback = false;
        let lifecycle = match signal {
            None => None,
            Some(signal) => match self.lifecycle.run(scope, signal) {
                Ok(outcome) => Some(outcome),
                Err(failure) => {
                    fallback = true;
                    message = Some(failure.to_string());
                    None
                }
            },
        };

        let facts = self.linker.facts().get_facts(&FactFilter::scope(scope))?;
        let synthetic_facts = facts.iter().filter(|f| f.is_assumed()).count();
        let observed_facts = facts.len() - synthetic_facts;

        let merged_any = matches!(&lifecycle, Some(LifecycleOutcome::Merged(r)) if !r.added.is_empty());
        let status = if fallback {
            DealStatus::SuccessFallback
        } else if merged_any {
            DealStatus::SuccessWithAssumptions
        } else if facts.is_empty() {
            DealStatus::NoFacts
        } else {
            DealStatus::Success
        };

        tracing::info!(scope = %scope, status = %status, observed_facts, synthetic_facts, "scope analyzed");
        Ok(ScopeReport {
            scope: scope.clone(),
            status,
            observed_facts,
            synthetic_facts,
            reconcile: Some(reconcile),
            lifecycle,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumption::{CandidateFact, ScopeContext};
    use crate::error::ProducerError;
    use crate::fact::NewFact;
    use crate::storage::{InMemoryFactStore, InMemoryInventoryStore};

    fn analyzer(fail: bool) -> DealAnalyzer {
        let producer = move |_: &ScopeContext| -> Result<Vec<CandidateFact>, ProducerError> {
            if fail {
                return Err(ProducerError::new("unavailable"));
            }
            Ok(vec![CandidateFact::new("applications", "erp", "Assumed ERP")])
        };
        DealAnalyzer::new(
            Arc::new(InMemoryFactStore::new()),
            Arc::new(InMemoryInventoryStore::new()),
            producer,
            &EngineConfig::default(),
        )
        .unwrap()
    }

    fn target() -> Scope {
        Scope::parse("D1", "target").unwrap()
    }

    #[test]
    fn empty_scope_reports_no_facts() {
        let report = analyzer(false).analyze(&target(), None);
        assert_eq!(report.status, DealStatus::NoFacts);
    }

    #[test]
    fn observed_only_is_success() {
        let analyzer = analyzer(false);
        analyzer
            .linker()
            .ingest(NewFact::new(&target(), "applications", "erp", "SAP ECC"), true)
            .unwrap();
        let report = analyzer.analyze(&target(), Some(&DetectionSignal::full(0.95).unwrap()));
        assert_eq!(report.status, DealStatus::Success);
        assert_eq!(report.observed_facts, 1);
    }

    #[test]
    fn missing_data_merges_assumptions() {
        let report = analyzer(false).analyze(&target(), Some(&DetectionSignal::missing(0.9).unwrap()));
        assert_eq!(report.status, DealStatus::SuccessWithAssumptions);
        assert_eq!(report.synthetic_facts, 1);
    }

    #[test]
    fn producer_failure_falls_back() {
        let report = analyzer(true).analyze(&target(), Some(&DetectionSignal::missing(0.9).unwrap()));
        assert_eq!(report.status, DealStatus::SuccessFallback);
        assert!(report.message.unwrap().contains("unavailable"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.reconcile.threshold = 1.5;
        let result = DealAnalyzer::new(
            Arc::new(InMemoryFactStore::new()),
            Arc::new(InMemoryInventoryStore::new()),
            |_: &ScopeContext| -> Result<Vec<CandidateFact>, ProducerError> { Ok(Vec::new()) },
            &config,
        );
        assert!(result.is_err());
    }

    #[test]
    fn analyze_deal_covers_both_sides() {
        let reports = analyzer(false).analyze_deal(&DealId::new("D1").unwrap(), |entity| {
            (entity == Entity::Buyer).then(|| DetectionSignal::missing(0.9).unwrap())
        });
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].status, DealStatus::NoFacts);
        assert_eq!(reports[1].status, DealStatus::SuccessWithAssumptions);
    }
}
