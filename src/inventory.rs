//! Inventory items: deduplicated canonical records per (deal, entity, type).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::error::ValidationError;
use crate::ids::{fingerprint, FactId, ItemId};
use crate::scope::{DealId, Entity, Scope};

/// Kind of canonical record held in the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryType {
    /// Software application.
    Application,
    /// Hosting, network or hardware.
    Infrastructure,
    /// Team or organizational unit.
    Organization,
    /// Third-party supplier.
    Vendor,
}

impl InventoryType {
    /// Every type, in reconciliation order.
    pub const ALL: [Self; 4] = [
        Self::Application,
        Self::Infrastructure,
        Self::Organization,
        Self::Vendor,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Infrastructure => "infrastructure",
            Self::Organization => "organization",
            Self::Vendor => "vendor",
        }
    }

    /// Maps a fact domain to the inventory type it projects into.
    ///
    /// Domains such as `cybersecurity` have no canonical inventory and return `None`.
    #[must_use]
    pub fn for_domain(domain: &str) -> Option<Self> {
        match domain.trim().to_ascii_lowercase().as_str() {
            "applications" | "application" => Some(Self::Application),
            "infrastructure" => Some(Self::Infrastructure),
            "organization" => Some(Self::Organization),
            "vendors" | "vendor" | "third_party" => Some(Self::Vendor),
            _ => None,
        }
    }
}

impl fmt::Display for InventoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InventoryType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownInventoryType {
                value: s.to_string(),
            })
    }
}

/// Lifecycle status of an inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Live and deduplicating.
    #[default]
    Active,
    /// Soft-deleted; excluded from dedup and reconciliation.
    Removed,
}

/// Path through which an item entered the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Projected from an extracted fact.
    Extracted,
    /// Loaded by a bulk import.
    Imported,
    /// Projected from a synthetic fact.
    Assumed,
    /// Entered by hand.
    Manual,
}

/// Deduplicated inventory record for one (deal, entity) scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Unique identifier.
    pub id: ItemId,
    /// Inventory kind.
    pub inventory_type: InventoryType,
    /// Side of the deal.
    pub entity: Entity,
    /// Owning deal.
    pub deal_id: DealId,
    /// Typed data; `name` is always set.
    #[serde(default)]
    pub data: Attributes,
    /// File the item was imported from.
    #[serde(default)]
    pub source_file: String,
    /// How the item was created.
    pub source_type: SourceType,
    /// Ordered and duplicate-free.
    #[serde(default)]
    pub source_fact_ids: Vec<FactId>,
    /// Active or removed.
    #[serde(default)]
    pub status: ItemStatus,
    /// Content fingerprint used for dedup.
    pub fingerprint: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Item name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.data.name.as_deref().unwrap_or_default()
    }

    /// Vendor, if known.
    #[must_use]
    pub fn vendor(&self) -> Option<&str> {
        self.data.vendor_str()
    }

    /// True unless soft-deleted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }

    /// True if the item belongs to `scope`.
    #[must_use]
    pub fn in_scope(&self, scope: &Scope) -> bool {
        scope.contains(&self.deal_id, self.entity)
    }

    /// True if the item lists `fact_id`.
    #[must_use]
    pub fn references(&self, fact_id: &FactId) -> bool {
        self.source_fact_ids.contains(fact_id)
    }
}

/// Input for adding an item; the store computes the fingerprint and dedups.
#[derive(Debug, Clone)]
pub struct NewItem {
    /// Inventory kind.
    pub inventory_type: InventoryType,
    /// Side of the deal.
    pub entity: Entity,
    /// Owning deal.
    pub deal_id: DealId,
    /// Typed data; `name` is required.
    pub data: Attributes,
    /// Import file, if any.
    pub source_file: String,
    /// How the item was created.
    pub source_type: SourceType,
}

impl NewItem {
    /// Item for `scope` with no source file.
    #[must_use]
    pub fn new(scope: &Scope, inventory_type: InventoryType, data: Attributes, source_type: SourceType) -> Self {
        Self {
            inventory_type,
            entity: scope.entity,
            deal_id: scope.deal_id.clone(),
            data,
            source_file: String::new(),
            source_type,
        }
    }

    /// Builds an item from raw boundary strings, as an import collaborator would.
    ///
    /// # Errors
    /// Returns `ValidationError` for an unknown inventory type, an entity
    /// outside `{target, buyer}`, or an empty deal id.
    pub fn parse(
        inventory_type: &str,
        entity: &str,
        deal_id: &str,
        data: Attributes,
        source_type: SourceType,
    ) -> Result<Self, ValidationError> {
        let scope = Scope::parse(deal_id, entity)?;
        Ok(Self::new(&scope, inventory_type.parse()?, data, source_type))
    }

    /// Sets the source file.
    #[must_use]
    pub fn source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = source_file.into();
        self
    }

    /// Validates the item and computes its dedup fingerprint.
    ///
    /// # Errors
    /// Returns `ValidationError::MissingField` without a name, or the
    /// attribute validation failure.
    pub fn fingerprint(&self) -> Result<String, ValidationError> {
        let name = self
            .data
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ValidationError::missing("name"))?;
        self.data.validate()?;
        Ok(fingerprint(
            &self.deal_id,
            self.entity,
            self.inventory_type,
            name,
            self.data.vendor_str(),
        ))
    }

    pub(crate) fn into_item(self, fingerprint: String) -> InventoryItem {
        InventoryItem {
            id: ItemId::generate(self.entity),
            inventory_type: self.inventory_type,
            entity: self.entity,
            deal_id: self.deal_id,
            data: self.data,
            source_file: self.source_file,
            source_type: self.source_type,
            source_fact_ids: Vec::new(),
            status: ItemStatus::Active,
            fingerprint,
            created_at: Utc::now(),
        }
    }
}

/// Query over the inventory. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    /// Restrict to one deal.
    pub deal_id: Option<DealId>,
    /// Restrict to one entity.
    pub entity: Option<Entity>,
    /// Restrict to one inventory type.
    pub inventory_type: Option<InventoryType>,
    /// Include soft-deleted items.
    pub include_removed: bool,
    /// Only items with no `source_fact_ids`.
    pub unlinked_only: bool,
}

impl ItemFilter {
    /// Active items of one scope.
    #[must_use]
    pub fn scope(scope: &Scope) -> Self {
        Self {
            deal_id: Some(scope.deal_id.clone()),
            entity: Some(scope.entity),
            ..Self::default()
        }
    }

    /// Restrict to `inventory_type`.
    #[must_use]
    pub fn inventory_type(mut self, inventory_type: InventoryType) -> Self {
        self.inventory_type = Some(inventory_type);
        self
    }

    /// Only items with no fact references.
    #[must_use]
    pub fn unlinked(mut self) -> Self {
        self.unlinked_only = true;
        self
    }

    /// True if `item` passes every set criterion.
    #[must_use]
    pub fn matches(&self, item: &InventoryItem) -> bool {
        self.deal_id.as_ref().map_or(true, |d| d == &item.deal_id)
            && self.entity.map_or(true, |e| e == item.entity)
            && self.inventory_type.map_or(true, |t| t == item.inventory_type)
            && (self.include_removed || item.is_active())
            && (!self.unlinked_only || item.source_fact_ids.is_empty())
    }
}
