//! Collaborator interfaces for the assumption lifecycle: the detection signal
//! that decides whether to run, and the producer that proposes synthetic facts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::error::{ProducerError, ValidationError};
use crate::fact::{Fact, FactStatus};
use crate::scope::Scope;

/// How much observed data a detector found for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionStatus {
    /// Observed data covers the scope.
    Full,
    /// Some observed data is present.
    Partial,
    /// No usable observed data.
    Missing,
}

impl fmt::Display for DetectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "FULL"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Missing => write!(f, "MISSING"),
        }
    }
}

/// Detection result consumed by the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionSignal {
    /// Coverage found by the detector.
    pub status: DetectionStatus,
    /// Detector confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

impl DetectionSignal {
    /// Creates a signal, validating the confidence.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidAttribute` if `confidence` is outside `[0.0, 1.0]`.
    pub fn new(status: DetectionStatus, confidence: f64) -> Result<Self, ValidationError> {
        let signal = Self { status, confidence };
        if !signal.has_valid_confidence() {
            return Err(ValidationError::attribute(
                "confidence",
                format!("{confidence} is out of range [0.0, 1.0]"),
            ));
        }
        Ok(signal)
    }

    /// A `MISSING` signal.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidAttribute` if `confidence` is outside `[0.0, 1.0]`.
    pub fn missing(confidence: f64) -> Result<Self, ValidationError> {
        Self::new(DetectionStatus::Missing, confidence)
    }

    /// A `PARTIAL` signal.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidAttribute` if `confidence` is outside `[0.0, 1.0]`.
    pub fn partial(confidence: f64) -> Result<Self, ValidationError> {
        Self::new(DetectionStatus::Partial, confidence)
    }

    /// A `FULL` signal.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidAttribute` if `confidence` is outside `[0.0, 1.0]`.
    pub fn full(confidence: f64) -> Result<Self, ValidationError> {
        Self::new(DetectionStatus::Full, confidence)
    }

    /// True if the confidence is a number in `[0.0, 1.0]`.
    ///
    /// Fields are public and signals deserialize from JSON, so a signal may
    /// bypass [`DetectionSignal::new`].
    #[must_use]
    pub fn has_valid_confidence(&self) -> bool {
        self.confidence.is_finite() && (0.0..=1.0).contains(&self.confidence)
    }
}

/// Everything a producer may look at. Facts are snapshot copies.
#[derive(Debug, Clone)]
pub struct ScopeContext {
    /// Scope being filled.
    pub scope: Scope,
    /// Signal that triggered the run.
    pub signal: DetectionSignal,
    /// Observed (non-synthetic) facts of the scope, in log order.
    pub observed: Vec<Fact>,
}

/// A proposed synthetic fact.
///
/// Deal, entity and the `assumed` tag are applied by the lifecycle manager;
/// producers cannot place candidates outside the scope they were asked about.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFact {
    /// Fact domain, e.g. `applications`.
    pub domain: String,
    /// Category within the domain.
    pub category: String,
    /// Item name.
    pub item: String,
    /// Details; `data_source` is overwritten with `assumed`.
    pub details: Attributes,
    /// Coverage status, `gap` by default.
    pub status: FactStatus,
    /// Basis for the assumption.
    pub evidence: String,
}

impl CandidateFact {
    /// Creates a candidate with empty details and `gap` status.
    #[must_use]
    pub fn new(domain: impl Into<String>, category: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            category: category.into(),
            item: item.into(),
            details: Attributes::default(),
            status: FactStatus::Gap,
            evidence: String::new(),
        }
    }

    /// Sets the details.
    #[must_use]
    pub fn details(mut self, details: Attributes) -> Self {
        self.details = details;
        self
    }

    /// Sets the evidence text.
    #[must_use]
    pub fn evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }
}

/// Re-invokable, side-effect-free source of synthetic facts.
pub trait AssumptionProducer: Send + Sync {
    /// Proposes candidate facts for the scope in `ctx`.
    fn produce(&self, ctx: &ScopeContext) -> Result<Vec<CandidateFact>, ProducerError>;
}

impl<F> AssumptionProducer for F
where
    F: Fn(&ScopeContext) -> Result<Vec<CandidateFact>, ProducerError> + Send + Sync,
{
    fn produce(&self, ctx: &ScopeContext) -> Result<Vec<CandidateFact>, ProducerError> {
        self(ctx)
    }
}
