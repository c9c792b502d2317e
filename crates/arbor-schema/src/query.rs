//! Structured query / aggregation specs.
//!
//! A `QuerySpec` is what a tool hands to the executor after the reasoning
//! engine has filled it in. Field names inside it are *untrusted* until the
//! backing store accepts them, so a query carries a cheap shape check and a
//! rename operation used by field recovery.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::GroupCount;

/// A record returned by the backing store.
pub type Record = serde_json::Map<String, Value>;

/// Aggregations share the query shape; `group_by` is what makes them one.
pub type AggregationSpec = QuerySpec;

const MAX_FIELD_NAME_LEN: usize = 128;

/// Plain identifier: `[A-Za-z_][A-Za-z0-9_]*`, bounded length.
pub fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_FIELD_NAME_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Filter operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// `*`-wildcard text match over normalized text.
    Like,
    /// Array field shares at least one element with the given array.
    ContainsAny,
}

impl FilterOp {
    fn is_ordering(&self) -> bool {
        matches!(
            self,
            FilterOp::GreaterThan | FilterOp::GreaterOrEqual | FilterOp::LessThan | FilterOp::LessOrEqual
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

/// Query or aggregation against one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub target_collection: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub group_by: Option<String>,
    /// Empty means every field.
    #[serde(default)]
    pub return_fields: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn new(target_collection: impl Into<String>) -> Self {
        Self {
            target_collection: target_collection.into(),
            filters: Vec::new(),
            group_by: None,
            return_fields: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::new(field, op, value));
        self
    }

    pub fn group_by(mut self, field: impl Into<String>) -> Self {
        self.group_by = Some(field.into());
        self
    }

    pub fn returning<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.return_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_aggregation(&self) -> bool {
        self.group_by.is_some()
    }

    /// Every field name the query mentions, in filter → group → return order.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        let names = self
            .filters
            .iter()
            .map(|f| f.field.as_str())
            .chain(self.group_by.as_deref())
            .chain(self.return_fields.iter().map(String::as_str));
        for name in names {
            if seen.insert(name) {
                out.push(name);
            }
        }
        out
    }

    pub fn references(&self, field: &str) -> bool {
        self.referenced_fields().contains(&field)
    }

    /// A copy with every occurrence of `from` replaced by `to`.
    pub fn with_field_renamed(&self, from: &str, to: &str) -> QuerySpec {
        let rename = |name: &String| {
            if name == from {
                to.to_string()
            } else {
                name.clone()
            }
        };
        QuerySpec {
            target_collection: self.target_collection.clone(),
            filters: self
                .filters
                .iter()
                .map(|f| Filter {
                    field: rename(&f.field),
                    op: f.op,
                    value: f.value.clone(),
                })
                .collect(),
            group_by: self.group_by.as_ref().map(rename),
            return_fields: self.return_fields.iter().map(rename).collect(),
            limit: self.limit,
        }
    }

    /// Shape check for specs decoded from reasoning-engine output.
    ///
    /// This does not check field existence; only that every name is a plain
    /// identifier and every filter value fits its operator.
    pub fn validate_shape(&self) -> Result<(), String> {
        if self.target_collection.trim().is_empty() {
            return Err("target_collection is empty".to_string());
        }
        for name in self.referenced_fields() {
            if !is_field_name(name) {
                return Err(format!("'{name}' is not a valid field name"));
            }
        }
        if self.limit == Some(0) {
            return Err("limit must be positive".to_string());
        }
        for filter in &self.filters {
            match filter.op {
                FilterOp::ContainsAny if !filter.value.is_array() => {
                    return Err(format!(
                        "contains_any on '{}' needs an array value",
                        filter.field
                    ));
                }
                FilterOp::Like if !filter.value.is_string() => {
                    return Err(format!("like on '{}' needs a string pattern", filter.field));
                }
                op if op.is_ordering() && !(filter.value.is_number() || filter.value.is_string()) => {
                    return Err(format!(
                        "ordering filter on '{}' needs a number or string",
                        filter.field
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Result of executing a `QuerySpec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutput {
    Rows {
        records: Vec<Record>,
    },
    Groups {
        field: String,
        groups: Vec<GroupCount>,
        /// Records matched before grouping.
        total: u64,
    },
}

impl QueryOutput {
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Rows { records } => records.len(),
            QueryOutput::Groups { groups, .. } => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
