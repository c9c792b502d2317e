//! Orchestrator: routes one request through the decision tree.
//!
//! ```text
//!   Started
//!     │
//!     ▼
//!   ┌─► offer tools of current node (available, not already used)
//!   │     │ reasoning engine: {tool, inputs}
//!   │     ▼
//!   │   validate name ──✗──► Failed(InvalidToolSelection)
//!   │   validate inputs ─✗─► Failed(InvalidToolInputs)
//!   │     │ ToolSelected
//!   │     ▼
//!   │   run tool: Status* Partial* Output
//!   │     │
//!   │     ├─ terminal / no child ─► Completed
//!   └─────┴─ child ─► Descended
//! ```
//!
//! `route` returns a lazy stream: nothing runs until it is polled, and
//! dropping it (or cancelling its token) abandons the in-flight call.
//! State lives inside the stream, so concurrent requests share nothing
//! but the immutable tree snapshot.

use std::pin::Pin;
use std::sync::Arc;

use arbor_reasoning::{ReasoningClient, ReasoningRequest, ReasoningTask, StructuredOutput};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::{RoutingContext, ToolContext};
use crate::error::TreeError;
use crate::executor::ResolvingExecutor;
use crate::inputs::validate_inputs;
use crate::state::ExecutionState;
use crate::tool::{ToolEvent, ToolOutput};
use crate::tree::{DecisionNode, ToolEntry, TreeHandle};

const SELECTION_INSTRUCTIONS: &str = "You are routing a user request through a decision tree. \
Choose exactly one of the offered tools for the current step and fill in its inputs. \
Use only the tool names and input names listed. Refer to collections and fields \
exactly as they appear in the context.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Tool invocations allowed per request.
    pub max_steps: usize,
    /// Top group values per field shown during tool selection.
    pub sample_values: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_steps: 8,
            sample_values: 5,
        }
    }
}

/// The engine's pick for one step.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolChoice {
    pub tool: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub reasoning: String,
}

impl StructuredOutput for ToolChoice {
    fn output_schema() -> Value {
        json!({
            "type": "object",
            "required": ["tool", "inputs"],
            "properties": {
                "tool": {"type": "string"},
                "inputs": {"type": "object"},
                "reasoning": {"type": "string"}
            }
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.tool.trim().is_empty() {
            return Err("tool name is empty".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    Started { request_id: Uuid, node: String },
    ToolSelected { node: String, tool: String, inputs: Value },
    Status { tool: String, message: String },
    Partial { tool: String, output: ToolOutput },
    Output { tool: String, output: ToolOutput },
    Descended { from: String, to: String },
    Completed { request_id: Uuid, results: Vec<ToolOutput> },
    Failed { request_id: Uuid, error: TreeError },
}

impl TreeEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TreeEvent::Completed { .. } | TreeEvent::Failed { .. })
    }
}

pub type TreeStream<'a> = Pin<Box<dyn Stream<Item = TreeEvent> + Send + 'a>>;

/// A drained event stream.
#[derive(Debug, Clone, Default)]
pub struct RouteOutcome {
    pub request_id: Option<Uuid>,
    pub events: Vec<TreeEvent>,
    pub results: Vec<ToolOutput>,
    pub error: Option<TreeError>,
}

impl RouteOutcome {
    pub async fn collect(mut stream: TreeStream<'_>) -> Self {
        let mut outcome = RouteOutcome::default();
        while let Some(event) = stream.next().await {
            match &event {
                TreeEvent::Started { request_id, .. } => outcome.request_id = Some(*request_id),
                TreeEvent::Completed { results, .. } => outcome.results = results.clone(),
                TreeEvent::Failed { error, .. } => outcome.error = Some(error.clone()),
                _ => {}
            }
            outcome.events.push(event);
        }
        outcome
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Names of the tools that were selected, in order.
    pub fn tools_selected(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TreeEvent::ToolSelected { tool, .. } => Some(tool.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn into_result(self) -> Result<Vec<ToolOutput>, TreeError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.results),
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    tree: Arc<TreeHandle>,
    reasoning: ReasoningClient,
    executor: Arc<ResolvingExecutor>,
    config: TreeConfig,
}

impl Orchestrator {
    pub fn new(
        tree: Arc<TreeHandle>,
        reasoning: ReasoningClient,
        executor: Arc<ResolvingExecutor>,
        config: TreeConfig,
    ) -> Self {
        Self {
            tree,
            reasoning,
            executor,
            config,
        }
    }

    pub fn tree(&self) -> &Arc<TreeHandle> {
        &self.tree
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn route(&self, prompt: impl Into<String>, context: RoutingContext) -> TreeStream<'_> {
        self.route_with_cancel(prompt, context, CancellationToken::new())
    }

    /// Drive the request to completion and collect its events.
    pub async fn run(&self, prompt: impl Into<String>, context: RoutingContext) -> RouteOutcome {
        RouteOutcome::collect(self.route(prompt, context)).await
    }

    pub fn route_with_cancel(
        &self,
        prompt: impl Into<String>,
        context: RoutingContext,
        cancel: CancellationToken,
    ) -> TreeStream<'_> {
        let prompt = prompt.into();
        Box::pin(async_stream::stream! {
            let tree = self.tree.current();
            let request_id = Uuid::new_v4();
            let mut state = ExecutionState::new(request_id, tree.root());
            yield TreeEvent::Started { request_id, node: state.current_node.clone() };

            let failure = loop {
                if cancel.is_cancelled() {
                    break Some(TreeError::Cancelled);
                }
                if state.steps >= self.config.max_steps {
                    break Some(TreeError::StepLimit(self.config.max_steps));
                }
                state.steps += 1;

                let Some(node) = tree.node(&state.current_node) else {
                    break Some(TreeError::UnknownNode(state.current_node.clone()));
                };
                let ctx = ToolContext {
                    request_id,
                    prompt: prompt.clone(),
                    routing: context.clone(),
                    previous: state.collected_results.clone(),
                    reasoning: self.reasoning.clone(),
                    executor: Arc::clone(&self.executor),
                    cancel: cancel.clone(),
                };

                let mut offered: Vec<&ToolEntry> = Vec::new();
                for entry in node.tools() {
                    if !state.blocks(entry.tool.descriptor()) && entry.tool.is_available(&ctx).await {
                        offered.push(entry);
                    }
                }
                if offered.is_empty() {
                    break Some(TreeError::NoTools(node.id.clone()));
                }

                let request = self.selection_request(&ctx, node, &offered, &state);
                let choice = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(TreeError::Cancelled),
                    choice = self.reasoning.ask::<ToolChoice>(request) => choice.map_err(TreeError::from),
                };
                let choice = match choice {
                    Ok(choice) => choice,
                    Err(err) => break Some(err),
                };

                let Some(entry) = offered.iter().copied().find(|e| e.tool.name() == choice.tool) else {
                    break Some(reject(node, &choice.tool, &state));
                };
                let descriptor = entry.tool.descriptor();
                let inputs = match validate_inputs(descriptor, choice.inputs) {
                    Ok(inputs) => inputs,
                    Err(reason) => break Some(TreeError::InvalidToolInputs {
                        tool: descriptor.name.clone(),
                        reason,
                    }),
                };

                let tool_name = descriptor.name.clone();
                state.record_visit(&node.id, &tool_name, inputs.to_value());
                tracing::info!(
                    request_id = %request_id,
                    node = %node.id,
                    tool = %tool_name,
                    step = state.steps,
                    "tool selected"
                );
                yield TreeEvent::ToolSelected {
                    node: node.id.clone(),
                    tool: tool_name.clone(),
                    inputs: inputs.to_value(),
                };

                let mut events = entry.tool.run(&ctx, inputs);
                let mut output = None;
                let mut stop = None;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(TreeError::Cancelled),
                        next = events.next() => Ok(next),
                    };
                    match next {
                        Err(err) => {
                            stop = Some(err);
                            break;
                        }
                        Ok(None) => {
                            stop = Some(TreeError::NoResult(tool_name.clone()));
                            break;
                        }
                        Ok(Some(Err(source))) => {
                            stop = Some(TreeError::Tool { tool: tool_name.clone(), source });
                            break;
                        }
                        Ok(Some(Ok(ToolEvent::Status(message)))) => {
                            yield TreeEvent::Status { tool: tool_name.clone(), message };
                        }
                        Ok(Some(Ok(ToolEvent::Partial(partial)))) => {
                            yield TreeEvent::Partial { tool: tool_name.clone(), output: partial };
                        }
                        Ok(Some(Ok(ToolEvent::Output(result)))) => {
                            output = Some(result);
                            break;
                        }
                    }
                }
                drop(events);

                if let Some(err) = stop {
                    break Some(err);
                }
                let Some(output) = output else {
                    break Some(TreeError::NoResult(tool_name));
                };
                state.collected_results.push(output.clone());
                yield TreeEvent::Output { tool: tool_name.clone(), output };

                if descriptor.is_terminal {
                    break None;
                }
                match &entry.child {
                    Some(child) => {
                        yield TreeEvent::Descended { from: node.id.clone(), to: child.clone() };
                        state.current_node = child.clone();
                    }
                    None => break None,
                }
            };

            state.terminated = true;
            match failure {
                Some(error) => {
                    tracing::warn!(
                        request_id = %request_id,
                        node = %state.current_node,
                        error = %error,
                        "request failed"
                    );
                    yield TreeEvent::Failed { request_id, error };
                }
                None => {
                    tracing::info!(
                        request_id = %request_id,
                        steps = state.steps,
                        "request completed"
                    );
                    yield TreeEvent::Completed { request_id, results: state.collected_results };
                }
            }
        })
    }

    fn selection_request(
        &self,
        ctx: &ToolContext,
        node: &DecisionNode,
        offered: &[&ToolEntry],
        state: &ExecutionState,
    ) -> ReasoningRequest {
        let tools: Vec<Value> = offered
            .iter()
            .map(|e| e.tool.descriptor().prompt_view())
            .collect();
        ReasoningRequest::new(ReasoningTask::ToolSelection, SELECTION_INSTRUCTIONS)
            .input("prompt", ctx.prompt.clone())
            .input("node", json!({"id": node.id, "description": node.description}))
            .input("tools", Value::Array(tools))
            .input("context", ctx.routing.prompt_view(self.config.sample_values))
            .input("previous_results", Value::Array(ctx.previous_summaries()))
            .input("visited_tools", json!(state.visited_names()))
    }
}

/// Explain why `tool` was not on offer at `node`.
fn reject(node: &DecisionNode, tool: &str, state: &ExecutionState) -> TreeError {
    let reason = match node.tool(tool) {
        None => "not registered at this node",
        Some(entry) if state.blocks(entry.tool.descriptor()) => {
            "already invoked in this request and not re-entrant"
        }
        Some(_) => "not available for this request",
    };
    TreeError::InvalidToolSelection {
        node: node.id.clone(),
        tool: tool.to_string(),
        reason: reason.to_string(),
    }
}
