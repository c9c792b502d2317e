//! In-memory backing store.
//!
//! Holds collections of JSON records and answers `QuerySpec`s with the same
//! failure classes a real store raises. Used for tests, demos, and as a
//! reference for what a `DataStore` implementation must report.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::RwLock;
use serde_json::Value;

use crate::model::{sort_groups, FieldType, GroupCount, NumericSummary};
use crate::normalize::{normalize_text, wildcard_match};
use crate::query::{Filter, FilterOp, QueryOutput, QuerySpec, Record};
use crate::store::{CollectionDescription, DataStore, FieldDescriptor, FieldStats, StoreError};

#[derive(Debug, Clone, Default)]
struct MemoryCollection {
    fields: Vec<FieldDescriptor>,
    records: Vec<Record>,
}

impl MemoryCollection {
    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

/// A `DataStore` backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, MemoryCollection>>,
    unavailable: RwLock<BTreeSet<String>>,
    executions: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a collection with the given fields.
    pub fn create_collection(&self, name: &str, fields: Vec<FieldDescriptor>) {
        self.collections.write().insert(
            name.to_string(),
            MemoryCollection {
                fields,
                records: Vec::new(),
            },
        );
    }

    /// Insert records. Each must be a JSON object using declared fields only.
    pub fn insert(&self, collection: &str, records: Vec<Value>) -> Result<usize, StoreError> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut inserted = Vec::with_capacity(records.len());
        for record in records {
            let Value::Object(map) = record else {
                return Err(StoreError::InvalidQuery(
                    "records must be JSON objects".to_string(),
                ));
            };
            if let Some(unknown) = map.keys().find(|k| !target.has_field(k)) {
                return Err(StoreError::PropertyNotFound {
                    collection: collection.to_string(),
                    field: unknown.clone(),
                });
            }
            inserted.push(map);
        }
        let count = inserted.len();
        target.records.extend(inserted);
        Ok(count)
    }

    pub fn drop_collection(&self, name: &str) -> bool {
        self.collections.write().remove(name).is_some()
    }

    /// Make every call touching `name` fail with a backend error.
    pub fn set_unavailable(&self, name: &str, unavailable: bool) {
        let mut set = self.unavailable.write();
        if unavailable {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    /// Number of `execute` calls served so far (including failed ones).
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    fn snapshot(&self, name: &str) -> Result<MemoryCollection, StoreError> {
        if self.unavailable.read().contains(name) {
            return Err(StoreError::Backend(format!(
                "collection '{name}' is not reachable"
            )));
        }
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }
}

// ============================================================================
// Value helpers
// ============================================================================

/// Group key for a scalar value. Arrays are expanded by the caller.
fn group_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn scalar_values(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn numeric_value(value: &Value, declared: &FieldType) -> Option<f64> {
    match declared {
        FieldType::Date => value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp() as f64),
        _ => value.as_f64(),
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) => normalize_text(a) == normalize_text(b),
        (Value::Number(_), Value::Number(_)) => {
            compare(left, right) == Some(std::cmp::Ordering::Equal)
        }
        _ => left == right,
    }
}

fn matches_filter(record: &Record, filter: &Filter) -> bool {
    let Some(value) = record.get(&filter.field) else {
        return false;
    };
    use std::cmp::Ordering::*;
    match filter.op {
        FilterOp::Equal => scalar_values(value)
            .iter()
            .any(|v| loosely_equal(v, &filter.value)),
        FilterOp::NotEqual => !scalar_values(value)
            .iter()
            .any(|v| loosely_equal(v, &filter.value)),
        FilterOp::GreaterThan => compare(value, &filter.value) == Some(Greater),
        FilterOp::GreaterOrEqual => matches!(compare(value, &filter.value), Some(Greater | Equal)),
        FilterOp::LessThan => compare(value, &filter.value) == Some(Less),
        FilterOp::LessOrEqual => matches!(compare(value, &filter.value), Some(Less | Equal)),
        FilterOp::Like => {
            let Some(pattern) = filter.value.as_str() else {
                return false;
            };
            scalar_values(value)
                .iter()
                .filter_map(|v| v.as_str())
                .any(|text| wildcard_match(pattern, text))
        }
        FilterOp::ContainsAny => {
            let wanted = scalar_values(&filter.value);
            scalar_values(value)
                .iter()
                .any(|v| wanted.iter().any(|w| loosely_equal(v, w)))
        }
    }
}

// ============================================================================
// DataStore
// ============================================================================

#[async_trait]
impl DataStore for MemoryStore {
    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    async fn describe(&self, collection: &str) -> Result<CollectionDescription, StoreError> {
        let data = self.snapshot(collection)?;
        Ok(CollectionDescription {
            name: collection.to_string(),
            record_count: data.records.len() as u64,
            fields: data.fields,
        })
    }

    async fn field_stats(
        &self,
        collection: &str,
        field: &FieldDescriptor,
        top_k: usize,
    ) -> Result<FieldStats, StoreError> {
        let data = self.snapshot(collection)?;
        if !data.has_field(&field.name) {
            return Err(StoreError::PropertyNotFound {
                collection: collection.to_string(),
                field: field.name.clone(),
            });
        }

        let mut counts: HashMap<String, u64> = HashMap::new();
        let mut numbers = Vec::new();
        let mut non_null = 0u64;
        for record in &data.records {
            let Some(value) = record.get(&field.name).filter(|v| !v.is_null()) else {
                continue;
            };
            non_null += 1;
            for scalar in scalar_values(value) {
                if let Some(key) = group_key(scalar) {
                    *counts.entry(key).or_default() += 1;
                }
                if let Some(n) = numeric_value(scalar, &field.declared_type) {
                    numbers.push(n);
                }
            }
        }

        let distinct = counts.len() as u64;
        let mut groups: Vec<GroupCount> = counts
            .into_iter()
            .map(|(value, count)| GroupCount { value, count })
            .collect();
        sort_groups(&mut groups, top_k);

        let numeric = if field.declared_type.is_numeric() || field.declared_type.is_temporal() {
            NumericSummary::from_values(&numbers)
        } else {
            None
        };

        Ok(FieldStats {
            groups,
            distinct,
            non_null,
            numeric,
        })
    }

    async fn execute(&self, spec: &QuerySpec) -> Result<QueryOutput, StoreError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        let data = self.snapshot(&spec.target_collection)?;

        if let Some(missing) = spec
            .referenced_fields()
            .into_iter()
            .find(|name| !data.has_field(name))
        {
            return Err(StoreError::PropertyNotFound {
                collection: spec.target_collection.clone(),
                field: missing.to_string(),
            });
        }

        let matched: Vec<&Record> = data
            .records
            .iter()
            .filter(|r| spec.filters.iter().all(|f| matches_filter(r, f)))
            .collect();

        if let Some(group_field) = &spec.group_by {
            let mut counts: HashMap<String, u64> = HashMap::new();
            for record in &matched {
                if let Some(value) = record.get(group_field) {
                    for scalar in scalar_values(value) {
                        if let Some(key) = group_key(scalar) {
                            *counts.entry(key).or_default() += 1;
                        }
                    }
                }
            }
            let mut groups: Vec<GroupCount> = counts
                .into_iter()
                .map(|(value, count)| GroupCount { value, count })
                .collect();
            sort_groups(&mut groups, spec.limit.unwrap_or(usize::MAX));
            return Ok(QueryOutput::Groups {
                field: group_field.clone(),
                groups,
                total: matched.len() as u64,
            });
        }

        let limit = spec.limit.unwrap_or(usize::MAX);
        let records = matched
            .into_iter()
            .take(limit)
            .map(|record| {
                if spec.return_fields.is_empty() {
                    record.clone()
                } else {
                    spec.return_fields
                        .iter()
                        .filter_map(|name| record.get(name).map(|v| (name.clone(), v.clone())))
                        .collect()
                }
            })
            .collect();
        Ok(QueryOutput::Rows { records })
    }
}
