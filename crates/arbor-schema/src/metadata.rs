//! Schema Metadata Store: the preprocessing pass and its published results.
//!
//! `build_schema` profiles a collection field by field and publishes the
//! finished `CollectionSchema` in one step. Readers clone an `Arc` out of the
//! map, so a rebuild never exposes a half-profiled schema and no lock is held
//! across a backing-store call.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::model::{sort_groups, CollectionSchema, FieldMetadata, DEFAULT_TOP_K};
use crate::store::{DataStore, FieldDescriptor, FieldStats, StoreError};

/// Configuration for the preprocessing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Maximum `(value, count)` pairs kept per field.
    pub top_k: usize,
    /// Text fields with more distinct values than this are treated as free
    /// text and carry no group statistics.
    pub max_text_cardinality: u64,
    /// Per-call timeout for backing-store requests.
    pub call_timeout_ms: u64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_text_cardinality: 250,
            call_timeout_ms: 10_000,
        }
    }
}

/// Outcome of preprocessing several collections.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub built: Vec<Arc<CollectionSchema>>,
    pub failed: Vec<(String, SchemaError)>,
}

impl BuildReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Holds one `CollectionSchema` per known collection.
pub struct SchemaStore {
    store: Arc<dyn DataStore>,
    schemas: DashMap<String, Arc<CollectionSchema>>,
    config: PreprocessConfig,
}

impl SchemaStore {
    pub fn new(store: Arc<dyn DataStore>, config: PreprocessConfig) -> Self {
        Self {
            store,
            schemas: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn data_store(&self) -> Arc<dyn DataStore> {
        Arc::clone(&self.store)
    }

    async fn timed<T, F>(&self, collection: &str, call: F) -> Result<T, SchemaError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let limit = Duration::from_millis(self.config.call_timeout_ms);
        let outcome = match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                after_ms: self.config.call_timeout_ms,
            }),
        };
        outcome.map_err(|err| SchemaError::CollectionUnavailable {
            collection: collection.to_string(),
            reason: err.to_string(),
        })
    }

    fn field_metadata(&self, descriptor: FieldDescriptor, stats: FieldStats) -> FieldMetadata {
        let declared = &descriptor.declared_type;
        let groups_meaningful = if declared.is_opaque() {
            false
        } else if declared.is_textual() {
            stats.distinct <= self.config.max_text_cardinality
        } else {
            true
        };

        let top_groups = groups_meaningful.then(|| {
            let mut groups = stats.groups;
            sort_groups(&mut groups, self.config.top_k);
            groups
        });

        let numeric = if declared.is_numeric() || declared.is_temporal() {
            stats.numeric
        } else {
            None
        };

        FieldMetadata {
            name: descriptor.name,
            declared_type: descriptor.declared_type,
            description: descriptor.description,
            top_groups,
            numeric,
            sample_count: stats.non_null,
        }
    }

    /// Profile `collection` and publish its schema, replacing any prior one.
    pub async fn build_schema(&self, collection: &str) -> Result<Arc<CollectionSchema>, SchemaError> {
        let description = self
            .timed(collection, self.store.describe(collection))
            .await?;

        let mut fields = Vec::with_capacity(description.fields.len());
        for descriptor in description.fields {
            let stats = self
                .timed(
                    collection,
                    self.store
                        .field_stats(collection, &descriptor, self.config.top_k),
                )
                .await?;
            fields.push(self.field_metadata(descriptor, stats));
        }

        let schema = Arc::new(CollectionSchema::new(
            collection,
            fields,
            description.record_count,
        )?);
        schema.validate(self.config.top_k)?;

        self.schemas
            .insert(collection.to_string(), Arc::clone(&schema));
        tracing::info!(
            collection = %collection,
            fields = schema.fields().len(),
            records = schema.record_count,
            "schema built"
        );
        Ok(schema)
    }

    /// Build several collections; one failure does not stop the batch.
    pub async fn build_all(&self, collections: &[String]) -> BuildReport {
        let mut report = BuildReport::default();
        for name in collections {
            match self.build_schema(name).await {
                Ok(schema) => report.built.push(schema),
                Err(err) => {
                    tracing::warn!(collection = %name, error = %err, "schema build failed");
                    report.failed.push((name.clone(), err));
                }
            }
        }
        report
    }

    pub fn get_schema(&self, collection: &str) -> Result<Arc<CollectionSchema>, SchemaError> {
        self.schemas
            .get(collection)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SchemaError::NotFound(collection.to_string()))
    }

    pub fn list_known_collections(&self) -> BTreeSet<String> {
        self.schemas.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Every known schema, ordered by collection name.
    pub fn all(&self) -> Vec<Arc<CollectionSchema>> {
        let mut out: Vec<_> = self
            .schemas
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        out.sort_by(|a, b| a.collection_name.cmp(&b.collection_name));
        out
    }

    /// Replace field descriptions; the schema is swapped as a whole.
    pub fn update_descriptions(
        &self,
        collection: &str,
        descriptions: &HashMap<String, String>,
    ) -> Result<Arc<CollectionSchema>, SchemaError> {
        let current = self.get_schema(collection)?;
        let next = Arc::new(current.with_descriptions(descriptions)?);
        self.schemas
            .insert(collection.to_string(), Arc::clone(&next));
        Ok(next)
    }

    /// Publish an already-built schema (snapshot restore).
    pub fn insert(&self, schema: CollectionSchema) -> Result<Arc<CollectionSchema>, SchemaError> {
        schema.validate(self.config.top_k)?;
        let schema = Arc::new(schema);
        self.schemas
            .insert(schema.collection_name.clone(), Arc::clone(&schema));
        Ok(schema)
    }

    /// Replace every known schema with `schemas` (snapshot restore).
    ///
    /// Groups are cut down to this store's K first. Nothing is replaced
    /// unless every schema validates.
    pub fn replace_all(
        &self,
        schemas: Vec<CollectionSchema>,
    ) -> Result<Vec<Arc<CollectionSchema>>, SchemaError> {
        let mut ready = Vec::with_capacity(schemas.len());
        for mut schema in schemas {
            schema.truncate_groups(self.config.top_k);
            schema.validate(self.config.top_k)?;
            ready.push(Arc::new(schema));
        }

        self.schemas.clear();
        for schema in &ready {
            self.schemas
                .insert(schema.collection_name.clone(), Arc::clone(schema));
        }
        tracing::info!(collections = ready.len(), "schemas replaced");
        Ok(ready)
    }

    pub fn remove(&self, collection: &str) -> Option<Arc<CollectionSchema>> {
        self.schemas.remove(collection).map(|(_, schema)| schema)
    }
}
