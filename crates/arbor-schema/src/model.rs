//! Collection schema data model.
//!
//! A `CollectionSchema` is the compact, schema-level evidence every other
//! component reasons over: field names, declared types, human descriptions,
//! and precomputed top-K value statistics.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Default bound on the number of `(value, count)` pairs kept per field.
pub const DEFAULT_TOP_K: usize = 30;

// ============================================================================
// Field Types
// ============================================================================

/// Declared type of a field, as reported by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    TextArray,
    Int,
    Number,
    Boolean,
    Date,
    Uuid,
    Object,
    Other(String),
}

impl FieldType {
    /// Number-like fields carry a `NumericSummary`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Number)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, FieldType::Date)
    }

    /// Fields whose cardinality is unbounded in general (free text, ids).
    pub fn is_textual(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::TextArray | FieldType::Uuid)
    }

    /// Structured values with no meaningful group statistics.
    pub fn is_opaque(&self) -> bool {
        matches!(self, FieldType::Object | FieldType::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Text => "text",
            FieldType::TextArray => "text[]",
            FieldType::Int => "int",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Uuid => "uuid",
            FieldType::Object => "object",
            FieldType::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// One `(value, count)` pair of group statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCount {
    pub value: String,
    pub count: u64,
}

impl GroupCount {
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        Self {
            value: value.into(),
            count,
        }
    }
}

/// Sort groups by count descending (ties by value ascending) and keep `k`.
///
/// The tie-break makes rebuilt statistics byte-for-byte stable.
pub fn sort_groups(groups: &mut Vec<GroupCount>, k: usize) {
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    groups.truncate(k);
}

/// Mean and range of a numeric or temporal field.
///
/// Dates are summarized over Unix timestamps (seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl NumericSummary {
    /// Summarize a sample; `None` for an empty one.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        for v in values {
            min = min.min(*v);
            max = max.max(*v);
            sum += v;
        }
        Some(Self {
            mean: sum / values.len() as f64,
            min,
            max,
        })
    }

    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }
}

// ============================================================================
// Field Metadata
// ============================================================================

/// Per-field metadata produced by the preprocessing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub name: String,
    pub declared_type: FieldType,
    pub description: String,
    /// Top-K `(value, count)` pairs; `None` when groups are not meaningful
    /// (free text, nested objects).
    pub top_groups: Option<Vec<GroupCount>>,
    /// Present for numeric and date fields.
    pub numeric: Option<NumericSummary>,
    /// Number of records holding a non-null value.
    pub sample_count: u64,
}

impl FieldMetadata {
    pub fn new(name: impl Into<String>, declared_type: FieldType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            description: String::new(),
            top_groups: None,
            numeric: None,
            sample_count: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_groups(mut self, groups: Vec<GroupCount>) -> Self {
        self.top_groups = Some(groups);
        self
    }

    /// The first `n` group values, most frequent first.
    pub fn sample_values(&self, n: usize) -> Vec<&str> {
        self.top_groups
            .as_deref()
            .unwrap_or_default()
            .iter()
            .take(n)
            .map(|g| g.value.as_str())
            .collect()
    }

    /// True when the field only has a description to go on.
    pub fn is_description_only(&self) -> bool {
        self.top_groups.is_none() && self.numeric.is_none()
    }

    fn groups_are_valid(&self, k: usize) -> bool {
        match &self.top_groups {
            None => true,
            Some(groups) => {
                groups.len() <= k && groups.windows(2).all(|w| w[0].count >= w[1].count)
            }
        }
    }
}

// ============================================================================
// Collection Schema
// ============================================================================

/// Schema and statistics of one collection.
///
/// Fields are kept sorted by name and are unique by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub collection_name: String,
    fields: Vec<FieldMetadata>,
    pub record_count: u64,
    pub built_at: DateTime<Utc>,
}

impl CollectionSchema {
    /// Build a schema, rejecting duplicate field names.
    pub fn new(
        collection_name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldMetadata>,
        record_count: u64,
    ) -> Result<Self, SchemaError> {
        let collection_name = collection_name.into();
        let mut by_name: BTreeMap<String, FieldMetadata> = BTreeMap::new();
        for field in fields {
            if by_name.contains_key(&field.name) {
                return Err(SchemaError::DuplicateField {
                    collection: collection_name,
                    field: field.name,
                });
            }
            by_name.insert(field.name.clone(), field);
        }

        Ok(Self {
            collection_name,
            fields: by_name.into_values().collect(),
            record_count,
            built_at: Utc::now(),
        })
    }

    pub fn fields(&self) -> &[FieldMetadata] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields
            .binary_search_by(|f| f.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.fields[idx])
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Compare everything except the build timestamp.
    pub fn same_statistics(&self, other: &CollectionSchema) -> bool {
        self.collection_name == other.collection_name
            && self.record_count == other.record_count
            && self.fields == other.fields
    }

    /// Re-sort every field's groups and keep at most `k` of them.
    pub fn truncate_groups(&mut self, k: usize) {
        for field in &mut self.fields {
            if let Some(groups) = field.top_groups.as_mut() {
                sort_groups(groups, k);
            }
        }
    }

    /// Check the structural invariants (used after deserialization).
    pub fn validate(&self, k: usize) -> Result<(), SchemaError> {
        for pair in self.fields.windows(2) {
            if pair[0].name >= pair[1].name {
                return Err(SchemaError::DuplicateField {
                    collection: self.collection_name.clone(),
                    field: pair[1].name.clone(),
                });
            }
        }
        for field in &self.fields {
            if !field.groups_are_valid(k) {
                return Err(SchemaError::InvalidGroups {
                    collection: self.collection_name.clone(),
                    field: field.name.clone(),
                    limit: k,
                });
            }
        }
        Ok(())
    }

    /// A copy of this schema with some field descriptions replaced.
    pub fn with_descriptions(
        &self,
        descriptions: &HashMap<String, String>,
    ) -> Result<Self, SchemaError> {
        let mut next = self.clone();
        for (name, description) in descriptions {
            let field = next
                .fields
                .iter_mut()
                .find(|f| &f.name == name)
                .ok_or_else(|| SchemaError::UnknownField {
                    collection: self.collection_name.clone(),
                    field: name.clone(),
                })?;
            field.description = description.clone();
        }
        next.built_at = Utc::now();
        Ok(next)
    }

    /// Compact JSON description handed to the reasoning engine.
    pub fn prompt_view(&self, sample_values: usize) -> serde_json::Value {
        let fields: Vec<serde_json::Value> = self
            .fields
            .iter()
            .map(|f| {
                let mut entry = serde_json::json!({
                    "name": f.name,
                    "type": f.declared_type.as_str(),
                    "description": f.description,
                });
                let samples = f.sample_values(sample_values);
                if !samples.is_empty() {
                    entry["top_values"] = serde_json::json!(samples);
                }
                if let Some(summary) = &f.numeric {
                    entry["mean"] = serde_json::json!(summary.mean);
                    entry["range"] = serde_json::json!([summary.min, summary.max]);
                }
                entry
            })
            .collect();

        serde_json::json!({
            "name": self.collection_name,
            "length": self.record_count,
            "fields": fields,
        })
    }
}
