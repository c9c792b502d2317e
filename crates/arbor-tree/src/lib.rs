//! Arbor Tree: decision-tree routing over runtime-discovered collections
//!
//! A request enters at the root node. At each node the reasoning engine
//! picks one of the tools on offer; the tool runs, its output is collected,
//! and routing descends into the branch the tree designates for that tool
//! until a terminal tool runs or no branch follows.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                           ORCHESTRATOR                             │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  prompt + RoutingContext          TreeHandle (Arc<DecisionTree>)   │
//! │  (schemas, equivalence graph)            │                         │
//! │             │                            ▼                         │
//! │             └──────► ExecutionState ◄── node ── tools ── child     │
//! │                          │                                         │
//! │                          ▼                                         │
//! │                 ┌──────────────────┐     ┌──────────────────────┐  │
//! │                 │  Tool::run       │────►│  ResolvingExecutor   │  │
//! │                 │  (event stream)  │     │  PropertyNotFound ─► │  │
//! │                 └──────────────────┘     │  one equivalent-field│  │
//! │                          │               │  retry               │  │
//! │                          ▼               └──────────────────────┘  │
//! │                 TreeEvent stream to caller                         │
//! │                                                                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - One request owns one `ExecutionState`; nothing mutable is shared
//!   between concurrent requests.
//! - A non-re-entrant tool runs at most once per request.
//! - A tool only runs after its inputs validate against its descriptor.
//! - The executor issues at most two backing-store calls per query.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod inputs;
pub mod orchestrator;
pub mod runtime;
pub mod state;
pub mod tool;
pub mod tools;
pub mod tree;

pub use config::{ArborConfig, ConfigError};
pub use context::{RoutingContext, ToolContext};
pub use error::{ExecutionError, ToolError, TreeError};
pub use executor::{Execution, ExecutorConfig, FieldSubstitution, ResolvingExecutor};
pub use inputs::validate_inputs;
pub use orchestrator::{Orchestrator, RouteOutcome, ToolChoice, TreeConfig, TreeEvent, TreeStream};
pub use runtime::{init_tracing, Arbor, ArborError};
pub use state::{ExecutionState, VisitedTool};
pub use tool::{
    tool_stream, InputKind, InputSpec, Tool, ToolDescriptor, ToolEvent, ToolInputs, ToolOutput,
    ToolStream,
};
pub use tools::{default_tree, HashtagAggregateTool, QueryTool, TextResponseTool};
pub use tree::{DecisionNode, DecisionTree, ToolEntry, TreeHandle};

pub use tokio_util::sync::CancellationToken;
