//! Backing data store boundary.
//!
//! The core never talks to a concrete database. It needs four capabilities:
//! enumerate a collection's fields, profile one field (top-K groups), run a
//! `QuerySpec`, and report a missing property *distinguishably* from any
//! other failure, because field recovery keys off that distinction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{FieldType, GroupCount, NumericSummary};
use crate::query::{QueryOutput, QuerySpec};

/// Errors reported by a backing store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// The query referenced a field the collection does not have.
    #[error("property '{field}' not found in collection '{collection}'")]
    PropertyNotFound { collection: String, field: String },

    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("backing store call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("backing store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_property_not_found(&self) -> bool {
        matches!(self, StoreError::PropertyNotFound { .. })
    }
}

/// A field as the store declares it, before any statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub declared_type: FieldType,
    #[serde(default)]
    pub description: String,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, declared_type: FieldType) -> Self {
        Self {
            name: name.into(),
            declared_type,
            description: String::new(),
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Field listing plus record count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDescription {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    pub record_count: u64,
}

/// Answer to a bounded grouped-count query on one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    /// Most frequent values, at most the requested K.
    pub groups: Vec<GroupCount>,
    /// Number of distinct non-null values.
    pub distinct: u64,
    /// Number of records with a non-null value.
    pub non_null: u64,
    /// Present for numeric and date fields.
    pub numeric: Option<NumericSummary>,
}

/// Capability the core calls to reach collection data.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Names of every collection the store hosts.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Enumerate a collection's fields and size.
    async fn describe(&self, collection: &str) -> Result<CollectionDescription, StoreError>;

    /// Grouped count over one field, bounded to `top_k` groups.
    async fn field_stats(
        &self,
        collection: &str,
        field: &FieldDescriptor,
        top_k: usize,
    ) -> Result<FieldStats, StoreError>;

    /// Run a query or aggregation.
    async fn execute(&self, spec: &QuerySpec) -> Result<QueryOutput, StoreError>;
}
