//! Error types for routing, tools and query execution.

use arbor_reasoning::ReasoningError;
use arbor_schema::StoreError;
use thiserror::Error;

/// Failure of a Resolving Executor invocation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    /// The query named a field the collection does not have and the
    /// equivalence graph offered no usable substitute.
    #[error("field '{field}' cannot be resolved in collection '{collection}' after {recovery_attempts} recovery attempt(s)")]
    UnresolvableField {
        collection: String,
        field: String,
        recovery_attempts: u32,
    },

    /// Spec targets a different collection than the schema supplied.
    #[error("query targets '{spec}' but schema is for '{schema}'")]
    SchemaMismatch { spec: String, schema: String },

    /// Spec failed the shape check before reaching the store.
    #[error("invalid query: {0}")]
    InvalidSpec(String),

    #[error("backing store call timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    /// Generic backing-store failure; not retried.
    #[error("backing store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ExecutionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout { after_ms } => ExecutionError::Timeout { after_ms },
            other => ExecutionError::Store(other),
        }
    }
}

/// Fatal error raised by a tool while it runs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ToolError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Reasoning(#[from] ReasoningError),

    #[error("collection '{0}' is not attached to this request")]
    UnknownCollection(String),

    #[error("{0}")]
    Failed(String),
}

/// Terminal failure of a routed request.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeError {
    /// The reasoning engine named a tool that is not on offer at this node
    /// (unknown, unavailable, or already used and not re-entrant).
    #[error("invalid tool selection '{tool}' at node '{node}': {reason}")]
    InvalidToolSelection {
        node: String,
        tool: String,
        reason: String,
    },

    #[error("invalid inputs for tool '{tool}': {reason}")]
    InvalidToolInputs { tool: String, reason: String },

    #[error("node '{0}' does not exist")]
    UnknownNode(String),

    #[error("node '{node}' already has parent '{parent}'")]
    DuplicateNode { node: String, parent: String },

    #[error("tool '{tool}' at node '{node}' has no child branch '{child}'")]
    UnknownChild {
        node: String,
        tool: String,
        child: String,
    },

    #[error("node '{0}' offers no available tools")]
    NoTools(String),

    #[error("tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("tool '{0}' ended without a result")]
    NoResult(String),

    #[error("tool selection failed: {0}")]
    Reasoning(#[from] ReasoningError),

    #[error("request exceeded {0} steps")]
    StepLimit(usize),

    #[error("request cancelled")]
    Cancelled,
}

impl TreeError {
    pub fn is_routing_error(&self) -> bool {
        matches!(
            self,
            TreeError::InvalidToolSelection { .. } | TreeError::InvalidToolInputs { .. }
        )
    }
}
