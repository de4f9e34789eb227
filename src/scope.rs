//! Transaction side and deal scoping.
//!
//! Every fact and inventory item belongs to exactly one deal and one side of
//! the transaction. Both are validated at construction and never defaulted:
//! they drive dedup fingerprints, purge predicates and link checks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Which side of the transaction a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    /// The company being acquired.
    Target,
    /// The acquiring company.
    Buyer,
}

impl Entity {
    /// Both sides, in processing order.
    pub const ALL: [Self; 2] = [Self::Target, Self::Buyer];

    /// Parses an entity from a string boundary value.
    ///
    /// # Errors
    /// Returns `ValidationError::InvalidEntity` for anything other than
    /// `target` or `buyer` (case-insensitive, surrounding whitespace ignored).
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "target" => Ok(Self::Target),
            "buyer" => Ok(Self::Buyer),
            _ => Err(ValidationError::InvalidEntity {
                value: value.to_string(),
            }),
        }
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Target => "target",
            Self::Buyer => "buyer",
        }
    }

    /// Short code used in generated identifiers.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Target => "TGT",
            Self::Buyer => "BUY",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Validated, non-empty deal identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DealId(String);

impl DealId {
    /// Creates a deal id, trimming surrounding whitespace.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyDealId` if the trimmed value is empty.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyDealId);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DealId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DealId> for String {
    fn from(id: DealId) -> Self {
        id.0
    }
}

/// A (deal, entity) pair; the unit of isolation for purge, merge and reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope {
    /// Owning deal.
    pub deal_id: DealId,
    /// Side of the deal.
    pub entity: Entity,
}

impl Scope {
    /// Pairs a deal with an entity.
    #[must_use]
    pub const fn new(deal_id: DealId, entity: Entity) -> Self {
        Self { deal_id, entity }
    }

    /// Parses both halves of a scope from raw strings.
    ///
    /// # Errors
    /// Propagates the deal id or entity validation failure.
    pub fn parse(deal_id: &str, entity: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(DealId::new(deal_id)?, Entity::parse(entity)?))
    }

    /// Returns true if the given deal/entity pair falls inside this scope.
    #[must_use]
    pub fn contains(&self, deal_id: &DealId, entity: Entity) -> bool {
        self.entity == entity && &self.deal_id == deal_id
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.deal_id, self.entity)
    }
}
