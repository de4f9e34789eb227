//! Typed attribute bags for facts and inventory items.
//!
//! A small vocabulary of well-known keys is typed and validated; everything
//! else rides along untouched in `extra` for domain-specific extensions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Where a record's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Observed in a source document.
    Extracted,
    /// Loaded by a bulk import.
    Imported,
    /// Produced by the assumption heuristic rather than observed.
    Assumed,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extracted => write!(f, "extracted"),
            Self::Imported => write!(f, "imported"),
            Self::Assumed => write!(f, "assumed"),
        }
    }
}

/// Attribute map with well-known keys plus an opaque passthrough bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Vendor or supplier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Product version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Where the record came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<DataSource>,

    /// Advisory only; never used structurally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,

    /// Why a synthetic record was assumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumption_basis: Option<String>,

    /// Domain-specific keys passed through unvalidated.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Attributes {
    /// Empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds attributes from an open JSON object.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidAttribute` if the value is not an
    /// object, a well-known key has the wrong type, or validation fails.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValidationError> {
        if !value.is_object() {
            return Err(ValidationError::attribute("details", "expected a JSON object"));
        }
        let attrs: Self = serde_json::from_value(value)
            .map_err(|e| ValidationError::attribute("details", e.to_string()))?;
        attrs.validate()?;
        Ok(attrs)
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the vendor.
    #[must_use]
    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the data source.
    #[must_use]
    pub fn with_data_source(mut self, source: DataSource) -> Self {
        self.data_source = Some(source);
        self
    }

    /// Sets the confidence score. Checked by `validate`.
    #[must_use]
    pub fn with_confidence(mut self, score: f64) -> Self {
        self.confidence_score = Some(score);
        self
    }

    /// Adds a passthrough key.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns true if these attributes describe a synthetic record.
    #[must_use]
    pub fn is_assumed(&self) -> bool {
        self.data_source == Some(DataSource::Assumed)
    }

    /// Validates the well-known keys only.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidAttribute` for blank strings or a
    /// confidence score outside `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let strings = [
            ("name", &self.name),
            ("vendor", &self.vendor),
            ("version", &self.version),
            ("assumption_basis", &self.assumption_basis),
        ];
        for (key, value) in strings {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ValidationError::attribute(key, "must not be blank"));
            }
        }

        if let Some(score) = self.confidence_score {
            if !score.is_finite() || !(0.0..=1.0).contains(&score) {
                return Err(ValidationError::attribute(
                    "confidence_score",
                    format!("{score} is out of range [0.0, 1.0]"),
                ));
            }
        }
        Ok(())
    }

    /// Returns the non-blank vendor, if any.
    #[must_use]
    pub fn vendor_str(&self) -> Option<&str> {
        self.vendor.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}
