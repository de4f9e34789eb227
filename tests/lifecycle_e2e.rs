use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dealfacts::{
    audit_links, AssumptionManager, Attributes, CandidateFact, DataSource, DealAnalyzer, DealId, DealStatus,
    DetectionSignal, EngineConfig, Entity, Fact, FactFilter, FactStore, InMemoryFactStore, InMemoryInventoryStore,
    ItemFilter, InventoryStore, LifecycleConfig, LifecycleFailure, LifecycleOutcome, LifecycleState, Linker, NewFact,
    ProducerError, Scope, ScopeContext, SourceType,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn linker() -> Linker {
    Linker::new(Arc::new(InMemoryFactStore::new()), Arc::new(InMemoryInventoryStore::new()))
}

fn d1(entity: &str) -> Scope {
    Scope::parse("D1", entity).unwrap()
}

fn sorted_ids(facts: &[Fact]) -> Vec<String> {
    let mut ids: Vec<String> = facts.iter().map(|f| f.id.to_string()).collect();
    ids.sort();
    ids
}

/// Yields five new candidates on every call.
fn rotating_producer() -> impl Fn(&ScopeContext) -> Result<Vec<CandidateFact>, ProducerError> {
    let calls = AtomicUsize::new(0);
    move |ctx: &ScopeContext| {
        let run = calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..5)
            .map(|i| {
                CandidateFact::new("applications", "assumed_app", format!("{} app {run}-{i}", ctx.scope.entity))
                    .details(Attributes::new().with_confidence(0.6))
                    .evidence("industry baseline")
            })
            .collect())
    }
}

#[test]
fn rerun_replaces_synthetic_facts() {
    init_tracing();
    let linker = linker();
    let manager = AssumptionManager::new(linker.clone(), rotating_producer(), LifecycleConfig::default());
    let scope = d1("target");

    let first = manager.run(&scope, &DetectionSignal::missing(0.9).unwrap()).unwrap();
    assert!(first.is_merged());
    let after_first = manager.synthetic_facts(&scope).unwrap();
    assert_eq!(after_first.len(), 5);

    let LifecycleOutcome::Merged(report) = manager.run(&scope, &DetectionSignal::missing(0.9).unwrap()).unwrap() else {
        panic!("second run should merge");
    };
    assert_eq!(report.purged, 5);
    assert_eq!(report.added.len(), 5);

    let after_second = manager.synthetic_facts(&scope).unwrap();
    assert_eq!(after_second.len(), 5);
    assert!(after_second.iter().all(|f| f.item.contains("app 1-")));
    assert!(after_second.iter().all(|f| f.details.data_source == Some(DataSource::Assumed)));

    // Items from the first run no longer carry references and are retired.
    let active = linker.inventory().get_items(&ItemFilter::scope(&scope)).unwrap();
    assert_eq!(active.len(), 5);
    assert!(active.iter().all(|i| i.source_type == SourceType::Assumed));
    assert!(audit_links(linker.facts().as_ref(), linker.inventory().as_ref()).unwrap().is_empty());
}

#[test]
fn invalid_candidate_rolls_back_whole_run() {
    init_tracing();
    let linker = linker();
    let scope = d1("target");

    let seed = AssumptionManager::new(linker.clone(), rotating_producer(), LifecycleConfig::default());
    seed.run(&scope, &DetectionSignal::missing(0.9).unwrap()).unwrap();
    let snapshot = seed.synthetic_facts(&scope).unwrap();
    assert_eq!(snapshot.len(), 5);

    let broken = AssumptionManager::new(
        linker.clone(),
        |_: &ScopeContext| -> Result<Vec<CandidateFact>, ProducerError> {
            Ok(vec![
                CandidateFact::new("applications", "erp", "Assumed ERP"),
                CandidateFact::new("applications", "crm", "Assumed CRM")
                    .details(Attributes::new().with_confidence(1.5)),
                CandidateFact::new("applications", "hcm", "Assumed HCM"),
            ])
        },
        LifecycleConfig::default(),
    );

    let err = broken.run(&scope, &DetectionSignal::missing(0.9).unwrap()).unwrap_err();
    assert!(matches!(err, LifecycleFailure::Merge { .. }));
    assert_eq!(err.restored(), 5);

    let restored = broken.synthetic_facts(&scope).unwrap();
    assert_eq!(sorted_ids(&restored), sorted_ids(&snapshot));
    assert!(restored.iter().all(Fact::is_linked));
    assert!(restored.iter().all(|f| !f.item.starts_with("Assumed")));
    assert_eq!(broken.state(&scope), LifecycleState::ObservedOnly);
    assert!(audit_links(linker.facts().as_ref(), linker.inventory().as_ref()).unwrap().is_empty());
}

#[test]
fn target_and_buyer_runs_are_isolated() {
    init_tracing();
    let linker = linker();
    let manager = AssumptionManager::new(linker.clone(), rotating_producer(), LifecycleConfig::default());
    let (target, buyer) = (d1("target"), d1("buyer"));

    manager.run(&target, &DetectionSignal::missing(0.9).unwrap()).unwrap();
    manager.run(&buyer, &DetectionSignal::missing(0.9).unwrap()).unwrap();
    let buyer_before = manager.synthetic_facts(&buyer).unwrap();

    manager.run(&target, &DetectionSignal::missing(0.9).unwrap()).unwrap();

    assert_eq!(manager.synthetic_facts(&target).unwrap().len(), 5);
    assert_eq!(manager.synthetic_facts(&buyer).unwrap(), buyer_before);
    assert!(manager
        .synthetic_facts(&target)
        .unwrap()
        .iter()
        .all(|f| f.entity == Entity::Target));

    let failing = AssumptionManager::new(
        linker,
        |_: &ScopeContext| -> Result<Vec<CandidateFact>, ProducerError> { Err(ProducerError::new("offline")) },
        LifecycleConfig::default(),
    );
    assert!(failing.run(&target, &DetectionSignal::missing(0.9).unwrap()).is_err());
    assert_eq!(failing.synthetic_facts(&buyer).unwrap(), buyer_before);
}

#[test]
fn other_deals_are_untouched() {
    let linker = linker();
    let manager = AssumptionManager::new(linker.clone(), rotating_producer(), LifecycleConfig::default());
    let other = Scope::parse("D2", "target").unwrap();

    manager.run(&other, &DetectionSignal::missing(0.9).unwrap()).unwrap();
    manager.run(&d1("target"), &DetectionSignal::missing(0.9).unwrap()).unwrap();
    manager.run(&d1("target"), &DetectionSignal::missing(0.9).unwrap()).unwrap();

    let d2_facts = linker.facts().get_facts(&FactFilter::scope(&other)).unwrap();
    assert_eq!(d2_facts.len(), 5);
    assert!(d2_facts.iter().all(|f| f.item.contains("app 0-")));
}

#[test]
fn observed_facts_survive_every_run() {
    let linker = linker();
    let scope = d1("buyer");
    let observed = linker
        .ingest(NewFact::new(&scope, "applications", "erp", "Oracle EBS"), true)
        .unwrap();

    let manager = AssumptionManager::new(linker.clone(), rotating_producer(), LifecycleConfig::default());
    for _ in 0..3 {
        manager.run(&scope, &DetectionSignal::partial(0.7).unwrap()).unwrap();
    }

    let fact = linker.facts().get_fact(&observed).unwrap().unwrap();
    assert!(fact.is_linked() && !fact.is_assumed());
    assert_eq!(linker.facts().get_facts(&FactFilter::scope(&scope)).unwrap().len(), 6);
}

#[test]
fn deal_analysis_reports_status_per_side() {
    init_tracing();
    let facts = Arc::new(InMemoryFactStore::new());
    let inventory = Arc::new(InMemoryInventoryStore::new());
    let config = EngineConfig::from_json_str(r#"{"lifecycle": {"min_confidence": 0.5}}"#).unwrap();
    let analyzer = DealAnalyzer::new(facts.clone(), inventory, rotating_producer(), &config).unwrap();

    analyzer
        .linker()
        .ingest(NewFact::new(&d1("target"), "applications", "erp", "SAP ECC"), true)
        .unwrap();

    let reports = analyzer.analyze_deal(&DealId::new("D1").unwrap(), |entity| match entity {
        Entity::Target => Some(DetectionSignal::full(0.95).unwrap()),
        Entity::Buyer => Some(DetectionSignal::missing(0.8).unwrap()),
    });

    assert_eq!(reports[0].status, DealStatus::Success);
    assert_eq!(reports[0].observed_facts, 1);
    assert_eq!(reports[1].status, DealStatus::SuccessWithAssumptions);
    assert_eq!(reports[1].synthetic_facts, 5);
    assert_eq!(facts.len().unwrap(), 6);
}
