//! Facts: append-only observations scoped to one deal and one entity.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::{Attributes, DataSource};
use crate::error::ValidationError;
use crate::ids::{FactId, ItemId};
use crate::scope::{DealId, Entity, Scope};

/// How completely a fact is documented in its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactStatus {
    /// Directly evidenced.
    #[default]
    Documented,
    /// Partially evidenced.
    Partial,
    /// Known gap in the evidence.
    Gap,
}

impl fmt::Display for FactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Documented => write!(f, "documented"),
            Self::Partial => write!(f, "partial"),
            Self::Gap => write!(f, "gap"),
        }
    }
}

/// An observation extracted from a source or inferred by the assumption heuristic.
///
/// Immutable once stored, except for `inventory_item_id`, which only the
/// linking and lifecycle paths may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Unique identifier.
    pub id: FactId,
    /// Domain, e.g. `applications` or `infrastructure`.
    pub domain: String,
    /// Category within the domain.
    pub category: String,
    /// What was observed.
    pub item: String,
    /// Typed details.
    #[serde(default)]
    pub details: Attributes,
    /// Evidence coverage.
    #[serde(default)]
    pub status: FactStatus,
    /// Supporting text.
    #[serde(default)]
    pub evidence: String,
    /// Side of the deal.
    pub entity: Entity,
    /// Owning deal.
    pub deal_id: DealId,
    /// Document the fact was extracted from.
    #[serde(default)]
    pub source_document: String,
    /// Linked inventory item, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_item_id: Option<ItemId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Fact {
    /// Returns true if the fact was produced by the assumption heuristic.
    #[must_use]
    pub fn is_assumed(&self) -> bool {
        self.details.is_assumed()
    }

    /// True if the fact points at an inventory item.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.inventory_item_id.is_some()
    }

    /// True if the fact belongs to `scope`.
    #[must_use]
    pub fn in_scope(&self, scope: &Scope) -> bool {
        scope.contains(&self.deal_id, self.entity)
    }

    /// Name used for inventory projection: `details.name`, else `item`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.details
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.item.as_str())
    }
}

/// Input for appending a fact; validated by [`NewFact::into_fact`].
#[derive(Debug, Clone)]
pub struct NewFact {
    /// Domain.
    pub domain: String,
    /// Category.
    pub category: String,
    /// Observed item.
    pub item: String,
    /// Details.
    pub details: Attributes,
    /// Evidence coverage.
    pub status: FactStatus,
    /// Supporting text.
    pub evidence: String,
    /// Side of the deal.
    pub entity: Entity,
    /// Owning deal.
    pub deal_id: DealId,
    /// Source document.
    pub source_document: String,
}

impl NewFact {
    /// Starts a fact with the required identifying fields.
    #[must_use]
    pub fn new(
        scope: &Scope,
        domain: impl Into<String>,
        category: impl Into<String>,
        item: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            category: category.into(),
            item: item.into(),
            details: Attributes::default(),
            status: FactStatus::default(),
            evidence: String::new(),
            entity: scope.entity,
            deal_id: scope.deal_id.clone(),
            source_document: String::new(),
        }
    }

    /// Starts a fact from raw boundary strings; entity and deal id are validated here.
    ///
    /// # Errors
    /// Returns `ValidationError` for an invalid entity or empty deal id.
    pub fn parse(
        deal_id: &str,
        entity: &str,
        domain: impl Into<String>,
        category: impl Into<String>,
        item: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let scope = Scope::parse(deal_id, entity)?;
        Ok(Self::new(&scope, domain, category, item))
    }

    /// Sets the details.
    #[must_use]
    pub fn details(mut self, details: Attributes) -> Self {
        self.details = details;
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn status(mut self, status: FactStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the evidence text.
    #[must_use]
    pub fn evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    /// Sets the source document.
    #[must_use]
    pub fn source_document(mut self, source: impl Into<String>) -> Self {
        self.source_document = source.into();
        self
    }

    /// Validates and materializes the fact with a fresh id.
    ///
    /// # Errors
    /// Returns `ValidationError::MissingField` for a blank domain, category or
    /// item, or the attribute validation failure.
    pub fn into_fact(self) -> Result<Fact, ValidationError> {
        let domain = required("domain", self.domain)?;
        let category = required("category", self.category)?;
        let item = required("item", self.item)?;
        self.details.validate()?;

        Ok(Fact {
            id: FactId::generate(self.entity),
            domain,
            category,
            item,
            details: self.details,
            status: self.status,
            evidence: self.evidence,
            entity: self.entity,
            deal_id: self.deal_id,
            source_document: self.source_document,
            inventory_item_id: None,
            created_at: Utc::now(),
        })
    }
}

fn required(field: &str, value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::missing(field));
    }
    Ok(trimmed.to_string())
}

/// Query over the fact log. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct FactFilter {
    /// Restrict to one deal.
    pub deal_id: Option<DealId>,
    /// Restrict to one entity.
    pub entity: Option<Entity>,
    /// Restrict to one domain.
    pub domain: Option<String>,
    /// Restrict to one category.
    pub category: Option<String>,
    /// Restrict to one data source.
    pub data_source: Option<DataSource>,
    /// Only facts without an inventory link.
    pub unlinked_only: bool,
}

impl FactFilter {
    /// Matches every fact in a (deal, entity) scope.
    #[must_use]
    pub fn scope(scope: &Scope) -> Self {
        Self {
            deal_id: Some(scope.deal_id.clone()),
            entity: Some(scope.entity),
            ..Self::default()
        }
    }

    /// Restrict to `domain`.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Restrict to `source`.
    #[must_use]
    pub fn data_source(mut self, source: DataSource) -> Self {
        self.data_source = Some(source);
        self
    }

    /// Only unlinked facts.
    #[must_use]
    pub fn unlinked(mut self) -> Self {
        self.unlinked_only = true;
        self
    }

    /// True if `fact` passes every set criterion.
    #[must_use]
    pub fn matches(&self, fact: &Fact) -> bool {
        self.deal_id.as_ref().map_or(true, |d| d == &fact.deal_id)
            && self.entity.map_or(true, |e| e == fact.entity)
            && self.domain.as_deref().map_or(true, |d| d == fact.domain)
            && self.category.as_deref().map_or(true, |c| c == fact.category)
            && self.data_source.map_or(true, |s| fact.details.data_source == Some(s))
            && (!self.unlinked_only || fact.inventory_item_id.is_none())
    }
}
