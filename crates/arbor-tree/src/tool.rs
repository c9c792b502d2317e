//! Tool contract.
//!
//! A tool is a named unit of retrieval or aggregation logic. The tree only
//! sees its [`ToolDescriptor`]; the reasoning engine picks a tool by name and
//! fills its inputs, which are validated against the descriptor before
//! [`Tool::run`] is called. A run is a stream of [`ToolEvent`]s that ends at
//! the first `Output` event or the first error.

use std::collections::BTreeMap;
use std::pin::Pin;

use arbor_schema::QueryOutput;
use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::executor::FieldSubstitution;

// ============================================================================
// Declared Inputs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    String,
    Integer,
    /// Non-negative integer (limits, sizes).
    Count,
    Number,
    Boolean,
    StringList,
    Object,
    Any,
}

impl InputKind {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            InputKind::String => value.is_string(),
            InputKind::Integer => value.is_i64() || value.is_u64(),
            InputKind::Count => value.is_u64(),
            InputKind::Number => value.is_number(),
            InputKind::Boolean => value.is_boolean(),
            InputKind::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            InputKind::Object => value.is_object(),
            InputKind::Any => true,
        }
    }
}

/// One declared input of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    pub kind: InputKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: String,
}

impl InputSpec {
    pub fn required(name: impl Into<String>, kind: InputKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            description: description.into(),
        }
    }

    pub fn optional(
        name: impl Into<String>,
        kind: InputKind,
        default: Option<Value>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default,
            description: description.into(),
        }
    }
}

/// Registration-time description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub inputs: Vec<InputSpec>,
    /// Stop the request after this tool regardless of child branches.
    pub is_terminal: bool,
    /// May run more than once in one request.
    pub reentrant: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            inputs: Vec::new(),
            is_terminal: false,
            reentrant: false,
        }
    }

    pub fn input(mut self, spec: InputSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn terminal(mut self) -> Self {
        self.is_terminal = true;
        self
    }

    pub fn reentrant(mut self) -> Self {
        self.reentrant = true;
        self
    }

    /// What the reasoning engine sees when choosing.
    pub fn prompt_view(&self) -> Value {
        let inputs: Vec<Value> = self
            .inputs
            .iter()
            .map(|i| {
                json!({
                    "name": i.name,
                    "type": i.kind,
                    "required": i.required,
                    "default": i.default,
                    "description": i.description,
                })
            })
            .collect();
        json!({
            "name": self.name,
            "description": self.description,
            "inputs": inputs,
            "ends_request": self.is_terminal,
        })
    }
}

/// Validated inputs: every declared input is present (defaults filled) and
/// has the declared kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInputs(BTreeMap<String, Value>);

impl ToolInputs {
    pub(crate) fn from_map(values: BTreeMap<String, Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn str(&self, name: &str) -> Result<&str, ToolError> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::Failed(format!("input '{name}' is missing")))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn usize(&self, name: &str) -> Option<usize> {
        self.get(name)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }
}

// ============================================================================
// Events
// ============================================================================

/// Typed payload produced by a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutput {
    Query {
        collection: String,
        output: QueryOutput,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        substitution: Option<FieldSubstitution>,
    },
    Text {
        text: String,
    },
}

impl ToolOutput {
    /// Short rendering for prompts and logs.
    pub fn summary(&self) -> Value {
        match self {
            ToolOutput::Query {
                collection, output, ..
            } => json!({"collection": collection, "result": output}),
            ToolOutput::Text { text } => json!({"text": text}),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Status(String),
    Partial(ToolOutput),
    /// Ends the run.
    Output(ToolOutput),
}

pub type ToolStream<'a> = Pin<Box<dyn Stream<Item = Result<ToolEvent, ToolError>> + Send + 'a>>;

/// Box a tool's event stream.
pub fn tool_stream<'a, S>(events: S) -> ToolStream<'a>
where
    S: Stream<Item = Result<ToolEvent, ToolError>> + Send + 'a,
{
    Box::pin(events)
}

// ============================================================================
// Tool Trait
// ============================================================================

#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Whether the tool should be offered for this request.
    async fn is_available(&self, _ctx: &ToolContext) -> bool {
        true
    }

    fn run<'a>(&'a self, ctx: &'a ToolContext, inputs: ToolInputs) -> ToolStream<'a>;
}
