//! Error types for dealfacts.
//!
//! All errors are strongly typed using thiserror. Validation and lifecycle
//! failures are always surfaced to the caller; linking degradations are
//! logged and absorbed by the ingestion path.

use thiserror::Error;

use crate::ids::{FactId, ItemId};
use crate::storage::StorageError;

/// Validation errors raised synchronously at a boundary.
///
/// Nothing that fails validation is ever silently defaulted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Entity is neither target nor buyer.
    #[error("Invalid entity '{value}': expected 'target' or 'buyer'")]
    InvalidEntity {
        /// Rejected input.
        value: String,
    },

    /// Deal id was empty or whitespace.
    #[error("Deal id cannot be empty")]
    EmptyDealId,

    /// A required field was absent or blank.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// An attribute value failed its check.
    #[error("Attribute '{key}' is invalid: {reason}")]
    InvalidAttribute {
        /// Attribute key.
        key: String,
        /// What was wrong.
        reason: String,
    },

    /// Inventory type name not recognized.
    #[error("Unknown inventory type '{value}'")]
    UnknownInventoryType {
        /// Rejected input.
        value: String,
    },

    /// Configuration did not parse or a value is out of range.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },
}

impl ValidationError {
    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingField {
            field: field.to_string(),
        }
    }

    pub(crate) fn attribute(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Inventory projection of a fact failed; the fact itself is valid and stays unlinked.
#[derive(Debug, Error)]
pub enum LinkingDegradation {
    /// The fact domain has no inventory type.
    #[error("Fact {fact_id} has domain '{domain}' with no inventory projection")]
    UnsupportedDomain {
        /// Fact left unlinked.
        fact_id: FactId,
        /// Its domain.
        domain: String,
    },

    /// The projected item failed validation.
    #[error("Fact {fact_id} could not be projected: {source}")]
    Invalid {
        /// Fact left unlinked.
        fact_id: FactId,
        /// Validation failure.
        #[source]
        source: ValidationError,
    },

    /// A store call failed while linking.
    #[error("Fact {fact_id} link to {item_id:?} failed: {source}")]
    Storage {
        /// Fact left unlinked.
        fact_id: FactId,
        /// Item being linked, if one was chosen.
        item_id: Option<ItemId>,
        /// Store failure.
        #[source]
        source: StorageError,
    },

    /// Fact and item are in different scopes.
    #[error("Fact {fact_id} and item {item_id} belong to different scopes")]
    ScopeMismatch {
        /// Fact left unlinked.
        fact_id: FactId,
        /// Item in the other scope.
        item_id: ItemId,
    },
}

/// Error reported by an assumption producer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Assumption producer failed: {message}")]
pub struct ProducerError {
    /// Producer-supplied description.
    pub message: String,
}

impl ProducerError {
    /// Creates a producer error with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Assumption generation or merge failed and the scope was rolled back.
#[derive(Debug, Error)]
pub enum LifecycleFailure {
    /// The producer failed.
    #[error("Generation failed for {scope} (restored {restored} synthetic facts): {source}")]
    Generation {
        /// Scope that was rolled back.
        scope: String,
        /// Facts restored from the snapshot.
        restored: usize,
        /// Producer failure.
        #[source]
        source: ProducerError,
    },

    /// A candidate failed validation or a write failed mid-merge.
    #[error("Merge failed for {scope} (restored {restored} synthetic facts): {reason}")]
    Merge {
        /// Scope that was rolled back.
        scope: String,
        /// Facts restored from the snapshot.
        restored: usize,
        /// What failed.
        reason: String,
    },

    /// A store call failed during the run.
    #[error("Storage failure for {scope} (restored {restored} synthetic facts): {source}")]
    Storage {
        /// Scope that was rolled back.
        scope: String,
        /// Facts restored from the snapshot.
        restored: usize,
        /// Store failure.
        #[source]
        source: StorageError,
    },
}

impl LifecycleFailure {
    /// Number of synthetic facts put back from the pre-run snapshot.
    #[must_use]
    pub const fn restored(&self) -> usize {
        match self {
            Self::Generation { restored, .. }
            | Self::Merge { restored, .. }
            | Self::Storage { restored, .. } => *restored,
        }
    }
}

/// Top-level error type for dealfacts.
#[derive(Debug, Error)]
pub enum DealError {
    /// Input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A store call failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// An assumption run was rolled back.
    #[error("Lifecycle failure: {0}")]
    Lifecycle(#[from] LifecycleFailure),
}

impl DealError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a lifecycle failure.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }
}

/// Result type alias for dealfacts operations.
pub type DealResult<T> = Result<T, DealError>;
