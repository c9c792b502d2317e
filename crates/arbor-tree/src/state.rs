//! Per-request execution state.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::tool::{ToolDescriptor, ToolOutput};

/// One tool invocation in a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitedTool {
    pub node: String,
    pub tool: String,
    pub inputs: Value,
}

/// Owned by one routed request; never shared between requests.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionState {
    pub request_id: Uuid,
    pub current_node: String,
    pub visited_tools: Vec<VisitedTool>,
    pub collected_results: Vec<ToolOutput>,
    pub terminated: bool,
    pub steps: usize,
}

impl ExecutionState {
    pub fn new(request_id: Uuid, root: &str) -> Self {
        Self {
            request_id,
            current_node: root.to_string(),
            visited_tools: Vec::new(),
            collected_results: Vec::new(),
            terminated: false,
            steps: 0,
        }
    }

    pub fn has_visited(&self, tool: &str) -> bool {
        self.visited_tools.iter().any(|v| v.tool == tool)
    }

    /// Whether running `descriptor` again would repeat a non-re-entrant tool.
    pub fn blocks(&self, descriptor: &ToolDescriptor) -> bool {
        !descriptor.reentrant && self.has_visited(&descriptor.name)
    }

    pub fn record_visit(&mut self, node: &str, tool: &str, inputs: Value) {
        self.visited_tools.push(VisitedTool {
            node: node.to_string(),
            tool: tool.to_string(),
            inputs,
        });
    }

    pub fn visited_names(&self) -> Vec<&str> {
        self.visited_tools.iter().map(|v| v.tool.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reentrant_tools_not_blocked() {
        let mut state = ExecutionState::new(Uuid::new_v4(), "base");
        state.record_visit("base", "query", json!({}));
        assert!(state.blocks(&ToolDescriptor::new("query", "")));
        assert!(!state.blocks(&ToolDescriptor::new("query", "").reentrant()));
        assert!(!state.blocks(&ToolDescriptor::new("aggregate", "")));
    }
}
