//! Similarity scoring for reconciliation.
//!
//! Scoring sits behind [`MatchScorer`] so weights or the whole heuristic can
//! be replaced without touching the traversal in the parent module.

use std::sync::OnceLock;

use regex::Regex;

use crate::fact::Fact;
use crate::inventory::InventoryItem;

/// Scores how likely a fact and an inventory item describe the same thing.
pub trait MatchScorer: Send + Sync {
    /// Returns a score in `[0.0, 1.0]`.
    fn score(&self, fact: &Fact, item: &InventoryItem) -> f64;
}

impl<F> MatchScorer for F
where
    F: Fn(&Fact, &InventoryItem) -> f64 + Send + Sync,
{
    fn score(&self, fact: &Fact, item: &InventoryItem) -> f64 {
        self(fact, item)
    }
}

/// Weighted name/vendor similarity.
///
/// `name_weight * sim(name) + vendor_weight * sim(vendor)` when both sides
/// carry a vendor, otherwise name similarity alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedNameScorer {
    /// Weight of name similarity.
    pub name_weight: f64,
    /// Weight of vendor similarity, used only when both sides have a vendor.
    pub vendor_weight: f64,
}

impl Default for WeightedNameScorer {
    fn default() -> Self {
        Self {
            name_weight: 0.7,
            vendor_weight: 0.3,
        }
    }
}

impl MatchScorer for WeightedNameScorer {
    fn score(&self, fact: &Fact, item: &InventoryItem) -> f64 {
        let name = name_similarity(&fact.item, item.name());
        match (fact.details.vendor_str(), item.vendor()) {
            (Some(fv), Some(iv)) => self.name_weight * name + self.vendor_weight * name_similarity(fv, iv),
            _ => name,
        }
    }
}

fn version_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 6.0, 12.2.1, v2, v10.1, 2019
    RE.get_or_init(|| Regex::new(r"^(v\d+(\.\d+)*|\d+(\.\d+)+|(19|20)\d{2})$").expect("static regex"))
}

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9.]+").expect("static regex"))
}

/// Lowercases and folds punctuation to single spaces.
#[must_use]
pub fn normalize_name(s: &str) -> String {
    let lowered = s.to_lowercase();
    separators()
        .replace_all(&lowered, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops trailing version tokens (`SAP ECC 6.0` → `sap ecc`).
#[must_use]
pub fn strip_version(normalized: &str) -> String {
    let mut tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
    while tokens.last().is_some_and(|t| version_token().is_match(t)) {
        tokens.pop();
    }
    tokens.join(" ")
}

/// Normalized edit-distance ratio in `[0.0, 1.0]` over version-stripped names.
///
/// If stripping empties either side, the plain normalized forms are compared.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let na = normalize_name(a);
    let nb = normalize_name(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    let (sa, sb) = (strip_version(&na), strip_version(&nb));
    if sa.is_empty() || sb.is_empty() {
        return strsim::normalized_levenshtein(&na, &nb);
    }
    strsim::normalized_levenshtein(&sa, &sb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::fact::NewFact;
    use crate::inventory::{InventoryType, NewItem, SourceType};
    use crate::scope::Scope;

    fn fact(item: &str, vendor: Option<&str>) -> Fact {
        let mut details = Attributes::new();
        details.vendor = vendor.map(str::to_string);
        NewFact::new(&Scope::parse("D1", "target").unwrap(), "applications", "erp", item)
            .details(details)
            .into_fact()
            .unwrap()
    }

    fn item(name: &str, vendor: Option<&str>) -> InventoryItem {
        let mut data = Attributes::new().with_name(name);
        data.vendor = vendor.map(str::to_string);
        let new = NewItem::new(&Scope::parse("D1", "target").unwrap(), InventoryType::Application, data, SourceType::Imported);
        let fp = new.fingerprint().unwrap();
        new.into_item(fp)
    }

    #[test]
    fn normalize_folds_case_and_punctuation() {
        assert_eq!(normalize_name("  SAP/ECC -- 6.0 "), "sap ecc 6.0");
    }

    #[test]
    fn strip_version_handles_common_forms() {
        assert_eq!(strip_version("sap ecc 6.0"), "sap ecc");
        assert_eq!(strip_version("windows server 2019"), "windows server");
        assert_eq!(strip_version("jira v8.2"), "jira");
        assert_eq!(strip_version("office 365"), "office 365");
        assert_eq!(strip_version("2019"), "");
    }

    #[test]
    fn similarity_bounds() {
        assert!((name_similarity("SAP ECC", "sap ecc") - 1.0).abs() < f64::EPSILON);
        assert!((name_similarity("SAP ECC 6.0", "SAP ECC") - 1.0).abs() < f64::EPSILON);
        assert!(name_similarity("Salesforce", "Workday") < 0.5);
        assert_eq!(name_similarity("", "SAP"), 0.0);
    }

    #[test]
    fn version_only_names_compare_raw() {
        let s = name_similarity("2019", "2016");
        assert!(s > 0.0 && s < 1.0);
    }

    #[test]
    fn vendor_weighting_applies_only_when_both_sides_have_vendor() {
        let scorer = WeightedNameScorer::default();
        let exact_name_other_vendor = scorer.score(&fact("SAP ECC", Some("Oracle")), &item("SAP ECC", Some("SAP")));
        assert!(exact_name_other_vendor < 1.0);
        assert!(exact_name_other_vendor >= 0.7);

        let name_only = scorer.score(&fact("SAP ECC", None), &item("SAP ECC", Some("SAP")));
        assert!((name_only - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn closures_are_scorers() {
        let scorer = |_: &Fact, _: &InventoryItem| 0.42;
        assert!((scorer.score(&fact("a", None), &item("b", None)) - 0.42).abs() < f64::EPSILON);
    }
}
