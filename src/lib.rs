//! # dealfacts - Fact ↔ Inventory Linking & Assumption Lifecycle
//!
//! dealfacts keeps two representations of a deal's IT landscape in agreement:
//! an append-only log of discrete **facts** (evidence-backed observations) and
//! a deduplicated **inventory** of items (applications, infrastructure,
//! organization units, vendors). Every record belongs to exactly one
//! (deal, entity) scope, where the entity is the `target` or the `buyer`.
//!
//! ## Core Concepts
//!
//! - **Fact**: An observation with domain, category, item and evidence; optionally linked to one item
//! - **InventoryItem**: A deduplicated record identified by a content fingerprint
//! - **Linker**: Projects facts into the inventory and maintains both references together
//! - **Reconciler**: Fuzzy-matches facts and items that were created independently
//! - **AssumptionManager**: Generates, purges and atomically replaces synthetic facts
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use dealfacts::{InMemoryFactStore, InMemoryInventoryStore, Linker, NewFact, Scope};
//!
//! let linker = Linker::new(Arc::new(InMemoryFactStore::new()), Arc::new(InMemoryInventoryStore::new()));
//! let scope = Scope::parse("D1", "target")?;
//!
//! let fact_id = linker.ingest(NewFact::new(&scope, "applications", "erp", "SAP ECC"), true)?;
//! let fact = linker.facts().get_fact(&fact_id)?.unwrap();
//! assert!(fact.is_linked());
//! # Ok::<(), dealfacts::DealError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// Core types
pub mod attributes;
pub mod error;
pub mod fact;
pub mod ids;
pub mod inventory;
pub mod scope;

// Storage and linking
pub mod linking;
pub mod storage;

// Reconciliation, assumptions and orchestration
pub mod analysis;
pub mod assumption;
pub mod config;
pub mod reconcile;

// Re-export primary types at crate root for convenience
pub use attributes::{Attributes, DataSource};
pub use error::{DealError, DealResult, LifecycleFailure, LinkingDegradation, ProducerError, ValidationError};
pub use fact::{Fact, FactFilter, FactStatus, NewFact};
pub use ids::{FactId, ItemId};
pub use inventory::{InventoryItem, InventoryType, ItemFilter, ItemStatus, NewItem, SourceType};
pub use scope::{DealId, Entity, Scope};

pub use linking::{audit_links, LinkIssue, Linker};
pub use storage::{FactStore, InMemoryFactStore, InMemoryInventoryStore, InventoryStore, StorageError};

pub use analysis::{DealAnalyzer, DealStatus, ScopeReport};
pub use assumption::{
    AssumptionManager, AssumptionProducer, CandidateFact, DetectionSignal, DetectionStatus, LifecycleConfig,
    LifecycleOutcome, LifecycleReport, LifecycleState, ScopeContext, SkipReason,
};
pub use config::EngineConfig;
pub use reconcile::{MatchScorer, ReconcileConfig, ReconcileMatch, ReconcileReport, Reconciler, WeightedNameScorer};
