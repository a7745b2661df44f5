//! Card records and the change types that flow through a reconciliation run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{lookup_path, FieldPath};

/// One card, backed by a single human-edited YAML file.
///
/// `fields` is always the parse of `raw_text`. The store keeps both so the
/// patch engine can edit text while the proposer sees structure.
#[derive(Debug, Clone)]
pub struct Record {
    /// File stem, e.g. `chase-sapphire-preferred`.
    pub id: String,
    pub location: PathBuf,
    pub fields: Value,
    pub raw_text: String,
}

impl Record {
    /// Human-facing card name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.fields
            .get("name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.id)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.fields
            .get("issuer")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Discontinued cards rotate through the inactive pool.
    pub fn is_active(&self) -> bool {
        !matches!(self.fields.get("discontinued"), Some(Value::Bool(true)))
    }

    /// Current value at a dotted path, `None` when the path is absent.
    pub fn value_at(&self, path: &FieldPath) -> Option<&Value> {
        lookup_path(&self.fields, path)
    }
}

/// Discrete trust label attached to each proposed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Low", alias = "LOW")]
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked search hit about one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A field-level correction proposed by the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeProposal {
    pub record_id: String,
    pub field_path: String,
    pub old_value: Value,
    pub new_value: Value,
    pub confidence: Confidence,
    pub citation_url: String,
}

/// Proposals for one record, in the order they were proposed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordChanges {
    pub record_id: String,
    pub changes: Vec<ChangeProposal>,
}

/// A proposal that was written into a record's text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedChange {
    pub field_path: String,
    pub old_value: Value,
    pub new_value: Value,
    pub citation_url: String,
}

impl From<&ChangeProposal> for AppliedChange {
    fn from(p: &ChangeProposal) -> Self {
        Self {
            field_path: p.field_path.clone(),
            old_value: p.old_value.clone(),
            new_value: p.new_value.clone(),
            citation_url: p.citation_url.clone(),
        }
    }
}

/// Everything applied to one record during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedChangeSet {
    pub record_id: String,
    pub record_name: String,
    pub changes: Vec<AppliedChange>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: Value) -> Record {
        Record {
            id: "amex-gold".into(),
            location: PathBuf::from("data/cards/amex-gold.yaml"),
            fields,
            raw_text: String::new(),
        }
    }

    #[test]
    fn display_name_falls_back_to_id() {
        assert_eq!(record(json!({"name": "Gold Card"})).display_name(), "Gold Card");
        assert_eq!(record(json!({"name": "  "})).display_name(), "amex-gold");
        assert_eq!(record(json!({})).display_name(), "amex-gold");
    }

    #[test]
    fn discontinued_cards_are_inactive() {
        assert!(record(json!({"name": "x"})).is_active());
        assert!(record(json!({"discontinued": false})).is_active());
        assert!(!record(json!({"discontinued": true})).is_active());
    }

    #[test]
    fn confidence_accepts_capitalised_labels() {
        let c: Confidence = serde_json::from_str("\"High\"").unwrap();
        assert_eq!(c, Confidence::High);
        let c: Confidence = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(c, Confidence::Medium);
        assert!(serde_json::from_str::<Confidence>("\"certain\"").is_err());
    }

    #[test]
    fn value_at_reads_nested_paths() {
        let r = record(json!({"signup_bonus": {"amount": 60000}}));
        let path = FieldPath::parse("signup_bonus.amount").unwrap();
        assert_eq!(r.value_at(&path), Some(&json!(60000)));
        let missing = FieldPath::parse("signup_bonus.spend").unwrap();
        assert_eq!(r.value_at(&missing), None);
    }
}
