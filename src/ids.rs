//! Identifier and fingerprint generation.
//!
//! Pure functions: callers validate required fields before invoking them.

use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::inventory::InventoryType;
use crate::scope::{DealId, Entity};

/// Separator between fingerprint fields; cannot appear in normalized input.
const FIELD_SEPARATOR: u8 = 0x1f;

/// Fingerprints are truncated to 16 bytes (32 hex characters).
const FINGERPRINT_BYTES: usize = 16;

/// Stable identifier of a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(String);

impl FactId {
    /// Generates a new fact id for the given side of the deal.
    #[must_use]
    pub fn generate(entity: Entity) -> Self {
        Self(new_id(&format!("F-{}", entity.code())))
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FactId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Stable identifier of an inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Generates a new item id for the given side of the deal.
    #[must_use]
    pub fn generate(entity: Entity) -> Self {
        Self(new_id(&format!("I-{}", entity.code())))
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Generates a globally unique id of the form `PREFIX-<32 hex chars>`.
///
/// ```
/// let id = dealfacts::ids::new_id("F-TGT");
/// assert!(id.starts_with("F-TGT-"));
/// assert_eq!(id.len(), "F-TGT-".len() + 32);
/// ```
#[must_use]
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Lowercases, trims and collapses internal whitespace.
#[must_use]
pub fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Computes the dedup fingerprint of an inventory item.
///
/// The entity is part of the hash, so the same name and vendor under target
/// and buyer yield distinct fingerprints.
#[must_use]
pub fn fingerprint(
    deal_id: &DealId,
    entity: Entity,
    inventory_type: InventoryType,
    name: &str,
    vendor: Option<&str>,
) -> String {
    let mut h = Hasher::new();
    let fields = [
        deal_id.as_str().trim().to_string(),
        entity.as_str().to_string(),
        inventory_type.as_str().to_string(),
        normalize_key(name),
        vendor.map(normalize_key).unwrap_or_default(),
    ];
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            h.update(&[FIELD_SEPARATOR]);
        }
        h.update(field.as_bytes());
    }
    let hash = h.finalize();
    hash.as_bytes()[..FINGERPRINT_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
