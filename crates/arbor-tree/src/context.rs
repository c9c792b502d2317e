//! Per-request context handed to routing and to tools.

use std::sync::Arc;

use arbor_mapping::EquivalenceGraph;
use arbor_reasoning::{ReasoningClient, ReasoningRequest, StructuredOutput};
use arbor_schema::{CollectionSchema, QuerySpec};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ToolError;
use crate::executor::{Execution, ResolvingExecutor};
use crate::tool::ToolOutput;

/// Active collections and the equivalence graph for one request.
///
/// Both are snapshots: a schema rebuild or mapping refresh during the
/// request does not change what the request sees.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    collections: Vec<Arc<CollectionSchema>>,
    graph: Arc<EquivalenceGraph>,
}

impl RoutingContext {
    pub fn new(mut collections: Vec<Arc<CollectionSchema>>, graph: Arc<EquivalenceGraph>) -> Self {
        collections.sort_by(|a, b| a.collection_name.cmp(&b.collection_name));
        collections.dedup_by(|a, b| a.collection_name == b.collection_name);
        Self { collections, graph }
    }

    pub fn collections(&self) -> &[Arc<CollectionSchema>] {
        &self.collections
    }

    pub fn collection_names(&self) -> Vec<&str> {
        self.collections
            .iter()
            .map(|s| s.collection_name.as_str())
            .collect()
    }

    pub fn schema(&self, collection: &str) -> Option<&Arc<CollectionSchema>> {
        self.collections
            .binary_search_by(|s| s.collection_name.as_str().cmp(collection))
            .ok()
            .map(|idx| &self.collections[idx])
    }

    pub fn graph(&self) -> &Arc<EquivalenceGraph> {
        &self.graph
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Equivalences touching at least one attached collection.
    pub fn equivalences(&self) -> Vec<String> {
        self.graph.prompt_view(&self.collection_names())
    }

    /// Schemas plus the equivalences among the attached collections.
    pub fn prompt_view(&self, sample_values: usize) -> Value {
        let schemas: Vec<Value> = self
            .collections
            .iter()
            .map(|s| s.prompt_view(sample_values))
            .collect();
        let equivalences = self.equivalences();
        json!({"collections": schemas, "equivalences": equivalences})
    }
}

/// Everything a tool may use while it runs.
#[derive(Clone)]
pub struct ToolContext {
    pub request_id: Uuid,
    pub prompt: String,
    pub routing: RoutingContext,
    /// Outputs of earlier steps of this request, oldest first.
    pub previous: Vec<ToolOutput>,
    pub(crate) reasoning: ReasoningClient,
    pub(crate) executor: Arc<ResolvingExecutor>,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(
        prompt: impl Into<String>,
        routing: RoutingContext,
        reasoning: ReasoningClient,
        executor: Arc<ResolvingExecutor>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            prompt: prompt.into(),
            routing,
            previous: Vec::new(),
            reasoning,
            executor,
            cancel: CancellationToken::new(),
        }
    }

    /// Ask the reasoning engine for a `T`.
    pub async fn ask<T: StructuredOutput>(&self, request: ReasoningRequest) -> Result<T, ToolError> {
        Ok(self.reasoning.ask(request).await?)
    }

    /// Run `spec` through the Resolving Executor against the attached schema
    /// of its target collection.
    pub async fn execute(&self, spec: &QuerySpec) -> Result<Execution, ToolError> {
        let schema = self
            .routing
            .schema(&spec.target_collection)
            .ok_or_else(|| ToolError::UnknownCollection(spec.target_collection.clone()))?;
        Ok(self
            .executor
            .execute(spec, schema, self.routing.graph())
            .await?)
    }

    pub fn previous_summaries(&self) -> Vec<Value> {
        self.previous.iter().map(ToolOutput::summary).collect()
    }
}
