//! Runtime facade: one value that owns every component.
//!
//! ```text
//!   Arbor
//!   ├── SchemaStore ──────── preprocess(names)
//!   ├── MappingEngine ────── refresh_mappings() ──► GraphHandle::publish
//!   ├── GraphHandle
//!   └── Orchestrator ─────── ask(prompt, collections) ──► TreeStream
//!         ├── TreeHandle (default tree)
//!         └── ResolvingExecutor
//! ```

use std::path::Path;
use std::sync::Arc;

use arbor_mapping::{EquivalenceGraph, GraphHandle, MappingEngine, MappingReport, SchemaSnapshot};
use arbor_reasoning::{ReasoningClient, ReasoningEngine};
use arbor_schema::{BuildReport, DataStore, SchemaError, SchemaStore};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::{ArborConfig, ConfigError};
use crate::context::RoutingContext;
use crate::error::TreeError;
use crate::executor::ResolvingExecutor;
use crate::orchestrator::{Orchestrator, RouteOutcome, TreeStream};
use crate::tools::default_tree;
use crate::tree::{DecisionTree, TreeHandle};

#[derive(Debug, Error)]
pub enum ArborError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

pub struct Arbor {
    schemas: Arc<SchemaStore>,
    graph: Arc<GraphHandle>,
    mapping: MappingEngine,
    orchestrator: Orchestrator,
    config: ArborConfig,
}

impl Arbor {
    /// Runtime over the default tree.
    pub fn new(
        store: Arc<dyn DataStore>,
        engine: Arc<dyn ReasoningEngine>,
        config: ArborConfig,
    ) -> Result<Self, ArborError> {
        Self::with_tree(store, engine, config, default_tree()?)
    }

    pub fn with_tree(
        store: Arc<dyn DataStore>,
        engine: Arc<dyn ReasoningEngine>,
        config: ArborConfig,
        tree: DecisionTree,
    ) -> Result<Self, ArborError> {
        config.validate()?;
        let reasoning = ReasoningClient::new(engine, config.reasoning.clone());
        let engine_name = reasoning.engine_name().to_string();
        let schemas = Arc::new(SchemaStore::new(
            Arc::clone(&store),
            config.preprocess.clone(),
        ));
        let executor = Arc::new(ResolvingExecutor::new(store, config.executor.clone()));
        let graph = Arc::new(GraphHandle::new(EquivalenceGraph::new(
            config.mapping.acceptance_threshold,
        )));
        let mapping = MappingEngine::new(reasoning.clone(), config.mapping.clone());
        let orchestrator = Orchestrator::new(
            Arc::new(TreeHandle::new(tree)),
            reasoning,
            executor,
            config.tree.clone(),
        );

        tracing::info!(
            engine = %engine_name,
            threshold = config.mapping.acceptance_threshold,
            "arbor runtime ready"
        );
        Ok(Self {
            schemas,
            graph,
            mapping,
            orchestrator,
            config,
        })
    }

    pub fn config(&self) -> &ArborConfig {
        &self.config
    }

    pub fn schemas(&self) -> &Arc<SchemaStore> {
        &self.schemas
    }

    pub fn graph(&self) -> &Arc<GraphHandle> {
        &self.graph
    }

    /// Live tree; registrations take effect for requests started afterwards.
    pub fn tree(&self) -> &Arc<TreeHandle> {
        self.orchestrator.tree()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Build (or rebuild) the schemas of `collections`.
    pub async fn preprocess(&self, collections: &[String]) -> BuildReport {
        self.schemas.build_all(collections).await
    }

    /// Infer equivalences across every known schema and publish the graph.
    pub async fn refresh_mappings(&self) -> MappingReport {
        let schemas = self.schemas.all();
        let report = self.mapping.infer_mappings(&schemas).await;
        let published = self.graph.publish(report.graph.clone());
        tracing::info!(
            collections = schemas.len(),
            edges = published.len(),
            warnings = report.warnings.len(),
            "equivalence graph published"
        );
        report
    }

    /// Snapshot the schemas of `collections` and the current graph.
    pub fn routing_context(&self, collections: &[&str]) -> Result<RoutingContext, ArborError> {
        let schemas = collections
            .iter()
            .map(|name| self.schemas.get_schema(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RoutingContext::new(schemas, self.graph.current()))
    }

    /// Route `prompt` over the attached `collections`.
    pub fn ask(
        &self,
        prompt: impl Into<String>,
        collections: &[&str],
    ) -> Result<TreeStream<'_>, ArborError> {
        Ok(self.orchestrator.route(prompt, self.routing_context(collections)?))
    }

    pub fn ask_with_cancel(
        &self,
        prompt: impl Into<String>,
        collections: &[&str],
        cancel: CancellationToken,
    ) -> Result<TreeStream<'_>, ArborError> {
        let context = self.routing_context(collections)?;
        Ok(self.orchestrator.route_with_cancel(prompt, context, cancel))
    }

    /// Route and drain the stream.
    pub async fn ask_collect(
        &self,
        prompt: impl Into<String>,
        collections: &[&str],
    ) -> Result<RouteOutcome, ArborError> {
        Ok(RouteOutcome::collect(self.ask(prompt, collections)?).await)
    }

    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        SchemaSnapshot::capture(&self.schemas, &self.graph.current()).save(path)
    }

    /// Replace schemas and graph with a saved snapshot, under this
    /// runtime's K and acceptance threshold.
    pub fn load_snapshot(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let graph = SchemaSnapshot::load(path)?
            .restore(&self.schemas, self.config.mapping.acceptance_threshold)?;
        self.graph.publish(graph);
        Ok(())
    }
}

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// Does nothing if a subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
