//! Engine configuration.
//!
//! Every section has working defaults; a JSON document only needs the keys it
//! overrides.
//!
//! ```
//! use dealfacts::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{"reconcile": {"threshold": 0.85}}"#).unwrap();
//! assert_eq!(config.reconcile.threshold, 0.85);
//! assert!(config.lifecycle.run_on_partial);
//! ```

use serde::{Deserialize, Serialize};

use crate::assumption::LifecycleConfig;
use crate::error::ValidationError;
use crate::reconcile::ReconcileConfig;

/// Top-level configuration for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Reconciliation tuning.
    pub reconcile: ReconcileConfig,
    /// Assumption lifecycle gate.
    pub lifecycle: LifecycleConfig,
}

impl EngineConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidConfig` if the document does not parse
    /// or a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.reconcile.validate()?;
        self.lifecycle.validate()
    }
}
