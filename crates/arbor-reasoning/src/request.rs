//! Structured prompts.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the engine is being asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningTask {
    /// Pick one tool of the current decision node and fill its inputs.
    ToolSelection,
    /// Decide whether two fields denote the same concept.
    FieldEquivalence,
    /// Produce a `QuerySpec` for a collection.
    QueryGeneration,
    /// Pick which properties of a collection play given roles.
    PropertySelection,
    /// Write a text answer from collected results.
    Summary,
    Custom(String),
}

impl fmt::Display for ReasoningTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasoningTask::ToolSelection => f.write_str("tool_selection"),
            ReasoningTask::FieldEquivalence => f.write_str("field_equivalence"),
            ReasoningTask::QueryGeneration => f.write_str("query_generation"),
            ReasoningTask::PropertySelection => f.write_str("property_selection"),
            ReasoningTask::Summary => f.write_str("summary"),
            ReasoningTask::Custom(name) => f.write_str(name),
        }
    }
}

/// A prompt made of named inputs plus the shape the answer must take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub task: ReasoningTask,
    pub instructions: String,
    pub inputs: BTreeMap<String, Value>,
    /// JSON schema hint for the expected output; filled by the client.
    pub output_schema: Value,
}

impl ReasoningRequest {
    pub fn new(task: ReasoningTask, instructions: impl Into<String>) -> Self {
        Self {
            task,
            instructions: instructions.into(),
            inputs: BTreeMap::new(),
            output_schema: Value::Null,
        }
    }

    pub fn input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).and_then(Value::as_str)
    }

    /// Render as a single text prompt for chat-style engines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.instructions);
        out.push_str("\n\n");
        for (name, value) in &self.inputs {
            out.push_str("## ");
            out.push_str(name);
            out.push('\n');
            match value {
                Value::String(s) => out.push_str(s),
                other => out.push_str(&other.to_string()),
            }
            out.push_str("\n\n");
        }
        if !self.output_schema.is_null() {
            out.push_str("Respond with a single JSON object matching this schema:\n");
            out.push_str(&self.output_schema.to_string());
            out.push('\n');
        }
        out
    }
}
