//! Resolving Executor.
//!
//! ```text
//!   spec ──► store.execute ──► Ok ───────────────────────────────► output
//!                 │
//!                 └─ PropertyNotFound(field)
//!                        │
//!                        ├─ graph.substitute_for(collection, field)
//!                        │     └─ Some(own_field) ─► rename ─► store.execute ─► Ok ─► output
//!                        │                                            └─ Err ─► UnresolvableField
//!                        └─ None ─────────────────────────────────────────────► UnresolvableField
//! ```
//!
//! At most two backing-store calls per invocation. Chains of equivalences
//! are not followed.

use std::sync::Arc;
use std::time::Duration;

use arbor_mapping::EquivalenceGraph;
use arbor_schema::{CollectionSchema, DataStore, QueryOutput, QuerySpec, StoreError};
use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-call deadline for the backing store.
    pub call_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
        }
    }
}

/// A field name swapped in by recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSubstitution {
    pub from: String,
    pub to: String,
    pub confidence: f32,
}

/// Successful execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub output: QueryOutput,
    pub substitution: Option<FieldSubstitution>,
    /// Backing-store round trips made (1 or 2).
    pub store_calls: u32,
}

pub struct ResolvingExecutor {
    store: Arc<dyn DataStore>,
    config: ExecutorConfig,
}

impl ResolvingExecutor {
    pub fn new(store: Arc<dyn DataStore>, config: ExecutorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    async fn call(&self, spec: &QuerySpec) -> Result<QueryOutput, StoreError> {
        let limit = Duration::from_millis(self.config.call_timeout_ms);
        match tokio::time::timeout(limit, self.store.execute(spec)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                after_ms: self.config.call_timeout_ms,
            }),
        }
    }

    /// Run `spec` against `schema`'s collection, recovering once from a
    /// wrong field name through `graph`.
    pub async fn execute(
        &self,
        spec: &QuerySpec,
        schema: &CollectionSchema,
        graph: &EquivalenceGraph,
    ) -> Result<Execution, ExecutionError> {
        spec.validate_shape().map_err(ExecutionError::InvalidSpec)?;
        if spec.target_collection != schema.collection_name {
            return Err(ExecutionError::SchemaMismatch {
                spec: spec.target_collection.clone(),
                schema: schema.collection_name.clone(),
            });
        }

        let missing = match self.call(spec).await {
            Ok(output) => {
                return Ok(Execution {
                    output,
                    substitution: None,
                    store_calls: 1,
                })
            }
            Err(StoreError::PropertyNotFound { field, .. }) => field,
            Err(other) => return Err(other.into()),
        };

        let collection = schema.collection_name.as_str();
        let unresolvable = || ExecutionError::UnresolvableField {
            collection: collection.to_string(),
            field: missing.clone(),
            recovery_attempts: 1,
        };

        let Some((replacement, edge)) =
            graph.substitute_for(collection, &missing, |name| schema.has_field(name))
        else {
            tracing::warn!(
                collection = %collection,
                field = %missing,
                "no equivalent field to recover with"
            );
            return Err(unresolvable());
        };

        tracing::info!(
            collection = %collection,
            from = %missing,
            to = %replacement,
            confidence = edge.confidence,
            "retrying query with equivalent field"
        );
        let corrected = spec.with_field_renamed(&missing, &replacement);
        match self.call(&corrected).await {
            Ok(output) => Ok(Execution {
                output,
                substitution: Some(FieldSubstitution {
                    from: missing.clone(),
                    to: replacement,
                    confidence: edge.confidence,
                }),
                store_calls: 2,
            }),
            Err(StoreError::PropertyNotFound { field, .. }) => {
                tracing::warn!(
                    collection = %collection,
                    field = %field,
                    "corrected query still references a missing field"
                );
                Err(unresolvable())
            }
            Err(other) => Err(other.into()),
        }
    }
}
