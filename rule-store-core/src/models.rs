//! Core domain models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::{CoreError, MAX_FIELDS};

/// Section holding enforcement rules (`p`, `p2`, ...)
pub const POLICY_SECTION: &str = "p";
/// Section holding role/grouping rules (`g`, `g2`, ...)
pub const GROUPING_SECTION: &str = "g";

/// A single policy rule as stored in the document database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDocument {
    /// Document identity
    #[serde(default)]
    pub id: String,
    /// Policy type tag, also the partition key
    #[serde(rename = "pType", default)]
    pub ptype: String,
    #[serde(default)]
    pub v0: String,
    #[serde(default)]
    pub v1: String,
    #[serde(default)]
    pub v2: String,
    #[serde(default)]
    pub v3: String,
    #[serde(default)]
    pub v4: String,
    #[serde(default)]
    pub v5: String,
}

impl RuleDocument {
    /// Build a document for `rule` under `ptype` with a fresh id.
    ///
    /// Values fill `v0` onward; columns past the end of the rule stay empty.
    pub fn new(ptype: &str, rule: &[String]) -> Result<Self, CoreError> {
        if rule.len() > MAX_FIELDS {
            return Err(CoreError::TooManyFields(rule.len()));
        }

        let mut doc = Self {
            id: Uuid::new_v4().to_string(),
            ptype: ptype.to_string(),
            ..Self::default()
        };
        for (slot, value) in doc.fields_mut().into_iter().zip(rule) {
            *slot = value.clone();
        }
        Ok(doc)
    }

    /// The partition this document lives in.
    pub fn partition_key(&self) -> &str {
        partition_key_for(&self.ptype)
    }

    /// Section the rule belongs to, taken from the first character of its type.
    pub fn section(&self) -> Option<&str> {
        section_of(&self.ptype)
    }

    /// All six value columns in order.
    pub fn fields(&self) -> [&str; MAX_FIELDS] {
        [
            self.v0.as_str(),
            self.v1.as_str(),
            self.v2.as_str(),
            self.v3.as_str(),
            self.v4.as_str(),
            self.v5.as_str(),
        ]
    }

    fn fields_mut(&mut self) -> [&mut String; MAX_FIELDS] {
        [
            &mut self.v0,
            &mut self.v1,
            &mut self.v2,
            &mut self.v3,
            &mut self.v4,
            &mut self.v5,
        ]
    }

    /// The rule tuple: values up to (not including) the first empty column.
    pub fn to_rule(&self) -> Vec<String> {
        self.fields()
            .into_iter()
            .take_while(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Partition key for rules of the given type.
pub fn partition_key_for(ptype: &str) -> &str {
    ptype
}

/// Section name for a policy type, e.g. `p2` -> `p`.
pub fn section_of(ptype: &str) -> Option<&str> {
    let first = ptype.chars().next()?;
    Some(&ptype[..first.len_utf8()])
}

/// Document field name for a value column index.
pub fn field_name(index: usize) -> String {
    format!("v{}", index)
}

/// In-memory rule model the engine evaluates against.
///
/// Rules are bucketed by section and then by policy type. Buckets are
/// created on first insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyModel {
    sections: BTreeMap<String, BTreeMap<String, Vec<Vec<String>>>>,
}

impl PolicyModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule to `sec`/`ptype`.
    pub fn add_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>) {
        self.sections
            .entry(sec.to_string())
            .or_default()
            .entry(ptype.to_string())
            .or_default()
            .push(rule);
    }

    /// Rules stored under `sec`/`ptype`, empty if the bucket does not exist.
    pub fn get_policy(&self, sec: &str, ptype: &str) -> &[Vec<String>] {
        self.sections
            .get(sec)
            .and_then(|types| types.get(ptype))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        self.get_policy(sec, ptype).iter().any(|r| r == rule)
    }

    /// Iterate `(ptype, rules)` pairs of a section in type order.
    pub fn section<'a>(
        &'a self,
        sec: &str,
    ) -> impl Iterator<Item = (&'a str, &'a [Vec<String>])> + 'a {
        self.sections
            .get(sec)
            .into_iter()
            .flat_map(|types| types.iter())
            .map(|(ptype, rules)| (ptype.as_str(), rules.as_slice()))
    }

    /// Drop every rule, keeping nothing.
    pub fn clear_policy(&mut self) {
        self.sections.clear();
    }

    /// Total number of rules across all sections.
    pub fn len(&self) -> usize {
        self.sections
            .values()
            .flat_map(|types| types.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_document_fills_prefix_only() {
        let doc = RuleDocument::new("p", &rule(&["a", "b"])).unwrap();
        assert_eq!(doc.v0, "a");
        assert_eq!(doc.v1, "b");
        assert!(doc.v2.is_empty());
        assert!(doc.v5.is_empty());
        assert_eq!(doc.partition_key(), "p");
        assert!(!doc.id.is_empty());
    }

    #[test]
    fn test_document_rejects_seven_fields() {
        let err = RuleDocument::new("p", &rule(&["1", "2", "3", "4", "5", "6", "7"])).unwrap_err();
        assert!(matches!(err, CoreError::TooManyFields(7)));
    }

    #[test]
    fn test_to_rule_stops_at_first_empty() {
        let doc = RuleDocument {
            ptype: "p".to_string(),
            v0: "alice".to_string(),
            v1: String::new(),
            v2: "read".to_string(),
            ..RuleDocument::default()
        };
        assert_eq!(doc.to_rule(), rule(&["alice"]));
    }

    #[test]
    fn test_serialized_shape() {
        let doc = RuleDocument::new("g", &rule(&["alice", "admin"])).unwrap();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["pType"], "g");
        assert_eq!(value["v1"], "admin");
        assert_eq!(value["v2"], "");

        let partial: RuleDocument =
            serde_json::from_value(serde_json::json!({"id": "1", "pType": "p", "v0": "bob"})).unwrap();
        assert_eq!(partial.to_rule(), rule(&["bob"]));
    }

    #[test]
    fn test_section_of() {
        assert_eq!(section_of("p"), Some("p"));
        assert_eq!(section_of("g2"), Some("g"));
        assert_eq!(section_of(""), None);
    }

    #[test]
    fn test_model_buckets() {
        let mut model = PolicyModel::new();
        model.add_policy("p", "p", rule(&["alice", "data1", "read"]));
        model.add_policy("g", "g", rule(&["alice", "admin"]));
        model.add_policy("g", "g2", rule(&["data1", "group"]));

        assert_eq!(model.len(), 3);
        assert!(model.has_policy("g", "g", &rule(&["alice", "admin"])));
        assert!(model.get_policy("p", "p2").is_empty());

        let types: Vec<_> = model.section("g").map(|(ptype, _)| ptype).collect();
        assert_eq!(types, vec!["g", "g2"]);

        model.clear_policy();
        assert!(model.is_empty());
    }
}
