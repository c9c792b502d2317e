//! `query` and `aggregate`: let the reasoning engine write a `QuerySpec`
//! for one collection and run it through the Resolving Executor.

use arbor_reasoning::{ReasoningRequest, ReasoningTask, StructuredOutput};
use arbor_schema::{CollectionSchema, Filter, QuerySpec};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::{
    tool_stream, InputKind, InputSpec, Tool, ToolDescriptor, ToolEvent, ToolInputs, ToolOutput,
    ToolStream,
};

/// Engine-written query body; the target collection comes from the tool
/// inputs, never from the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct GeneratedQuery {
    #[serde(default)]
    filters: Vec<Filter>,
    #[serde(default)]
    group_by: Option<String>,
    #[serde(default)]
    return_fields: Vec<String>,
    #[serde(default)]
    limit: Option<usize>,
}

impl GeneratedQuery {
    fn into_spec(self, collection: &str) -> QuerySpec {
        QuerySpec {
            target_collection: collection.to_string(),
            filters: self.filters,
            group_by: self.group_by,
            return_fields: self.return_fields,
            limit: self.limit,
        }
    }
}

impl StructuredOutput for GeneratedQuery {
    fn output_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "filters": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["field", "op", "value"],
                        "properties": {
                            "field": {"type": "string"},
                            "op": {"enum": [
                                "equal", "not_equal", "greater_than", "greater_or_equal",
                                "less_than", "less_or_equal", "like", "contains_any"
                            ]},
                            "value": {}
                        }
                    }
                },
                "group_by": {"type": ["string", "null"]},
                "return_fields": {"type": "array", "items": {"type": "string"}},
                "limit": {"type": ["integer", "null"]}
            }
        })
    }

    fn validate(&self) -> Result<(), String> {
        self.clone().into_spec("_").validate_shape()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Rows,
    Groups,
}

/// Fetch rows, or grouped counts, from one attached collection.
pub struct QueryTool {
    descriptor: ToolDescriptor,
    mode: Mode,
}

impl QueryTool {
    pub fn query() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "query",
                "Retrieve matching records from one collection, optionally filtered. \
                 Use when the user wants to see specific items.",
            )
            .input(InputSpec::required(
                "collection",
                InputKind::String,
                "Name of the collection to search",
            ))
            .input(InputSpec::optional(
                "limit",
                InputKind::Count,
                Some(json!(20)),
                "Maximum number of records",
            )),
            mode: Mode::Rows,
        }
    }

    pub fn aggregate() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "aggregate",
                "Count records of one collection grouped by a field, optionally filtered. \
                 Use for 'how many' and 'who/what most' questions.",
            )
            .input(InputSpec::required(
                "collection",
                InputKind::String,
                "Name of the collection to aggregate",
            ))
            .input(InputSpec::optional(
                "limit",
                InputKind::Count,
                Some(json!(30)),
                "Maximum number of groups",
            )),
            mode: Mode::Groups,
        }
    }

    fn request(&self, ctx: &ToolContext, schema: &CollectionSchema) -> ReasoningRequest {
        let instructions = match self.mode {
            Mode::Rows => "Write a query over the collection that retrieves the records the user asks for. \
                           Leave group_by empty.",
            Mode::Groups => "Write an aggregation over the collection that answers the user. \
                             Set group_by to the field whose values should be counted.",
        };
        ReasoningRequest::new(ReasoningTask::QueryGeneration, instructions)
            .input("prompt", ctx.prompt.clone())
            .input("collection", schema.collection_name.clone())
            .input("schema", schema.prompt_view(5))
            .input("equivalences", ctx.routing.equivalences())
            .input("previous_results", Value::Array(ctx.previous_summaries()))
    }
}

#[async_trait]
impl Tool for QueryTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn is_available(&self, ctx: &ToolContext) -> bool {
        !ctx.routing.is_empty()
    }

    fn run<'a>(&'a self, ctx: &'a ToolContext, inputs: ToolInputs) -> ToolStream<'a> {
        tool_stream(async_stream::try_stream! {
            let collection = inputs.str("collection")?.to_string();
            let schema = ctx
                .routing
                .schema(&collection)
                .ok_or_else(|| ToolError::UnknownCollection(collection.clone()))?;

            let generated: GeneratedQuery = ctx.ask(self.request(ctx, schema)).await?;
            let mut spec = generated.into_spec(&collection);
            if let Some(cap) = inputs.usize("limit") {
                spec.limit = Some(spec.limit.map_or(cap, |l| l.min(cap)));
            }
            match self.mode {
                Mode::Rows => spec.group_by = None,
                Mode::Groups if spec.group_by.is_none() => {
                    Err::<(), _>(ToolError::Failed("aggregation has no group_by field".to_string()))?;
                }
                Mode::Groups => {}
            }

            yield ToolEvent::Status(format!("Querying {collection}..."));
            let execution = ctx.execute(&spec).await?;
            if let Some(sub) = &execution.substitution {
                yield ToolEvent::Status(format!(
                    "Field '{}' does not exist in {collection}; used '{}' instead",
                    sub.from, sub.to
                ));
            }
            yield ToolEvent::Output(ToolOutput::Query {
                collection,
                output: execution.output,
                substitution: execution.substitution,
            });
        })
    }
}
