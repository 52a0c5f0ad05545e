//! Builds rule selection queries

use rule_store_core::{field_name, CoreError, MAX_FIELDS};
use rule_store_storage::QuerySpec;
use std::collections::BTreeMap;

/// Equality filter over the stored rule columns.
///
/// ```
/// use rule_store_adapter::RuleQuery;
///
/// let spec = RuleQuery::new().ptype("p").field(0, "alice").build();
/// assert_eq!(spec.query, "SELECT * FROM root WHERE root.pType = @pType AND root.v0 = @v0");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleQuery {
    ptype: Option<String>,
    fields: BTreeMap<usize, String>,
}

impl RuleQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ptype(mut self, ptype: impl Into<String>) -> Self {
        self.ptype = Some(ptype.into());
        self
    }

    /// Require `v<index>` to equal `value`
    pub fn field(mut self, index: usize, value: impl Into<String>) -> Self {
        self.fields.insert(index, value.into());
        self
    }

    /// Match `rule` exactly on its leading columns, one clause per value.
    pub fn for_rule(ptype: &str, rule: &[String]) -> Result<Self, CoreError> {
        if rule.len() > MAX_FIELDS {
            return Err(CoreError::TooManyFields(rule.len()));
        }
        Ok(rule
            .iter()
            .enumerate()
            .fold(Self::new().ptype(ptype), |query, (i, value)| {
                query.field(i, value.as_str())
            }))
    }

    /// Match `field_values` starting at column `field_index`; empty values
    /// are wildcards and columns past the last one are ignored.
    pub fn for_filter(ptype: &str, field_index: usize, field_values: &[String]) -> Self {
        field_values
            .iter()
            .enumerate()
            .filter_map(|(offset, value)| Some((field_index.checked_add(offset)?, value)))
            .filter(|(i, value)| *i < MAX_FIELDS && !value.is_empty())
            .fold(Self::new().ptype(ptype), |query, (i, value)| {
                query.field(i, value.as_str())
            })
    }

    /// Render as `SELECT * FROM root WHERE ...` with named parameters
    pub fn build(&self) -> QuerySpec {
        let mut clauses = Vec::new();
        let mut params = Vec::new();

        if let Some(ptype) = &self.ptype {
            clauses.push("root.pType = @pType".to_string());
            params.push(("@pType".to_string(), ptype.clone()));
        }
        for (index, value) in &self.fields {
            let name = field_name(*index);
            clauses.push(format!("root.{} = @{}", name, name));
            params.push((format!("@{}", name), value.clone()));
        }

        let mut text = "SELECT * FROM root".to_string();
        if !clauses.is_empty() {
            text.push_str(" WHERE ");
            text.push_str(&clauses.join(" AND "));
        }

        params
            .into_iter()
            .fold(QuerySpec::new(text), |spec, (name, value)| {
                spec.with_parameter(name, value)
            })
    }
}

impl From<RuleQuery> for QuerySpec {
    fn from(query: RuleQuery) -> Self {
        query.build()
    }
}
