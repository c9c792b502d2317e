//! `hashtag_aggregate`: count the posts mentioning a hashtag, per author.
//!
//! The reasoning engine only picks which fields hold the author and the post
//! text; the match and the per-author counting are deterministic.

use std::collections::HashMap;

use arbor_reasoning::{ReasoningRequest, ReasoningTask, StructuredOutput};
use arbor_schema::{
    is_field_name, normalize_hashtag, sort_groups, CollectionSchema, FilterOp, GroupCount,
    QueryOutput, QuerySpec, Record,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::{
    tool_stream, InputKind, InputSpec, Tool, ToolDescriptor, ToolEvent, ToolInputs, ToolOutput,
    ToolStream,
};

const DEFAULT_LIMIT: u64 = 1000;

#[derive(Debug, Clone, Deserialize)]
struct HashtagProperties {
    author_property: String,
    text_property: String,
}

impl StructuredOutput for HashtagProperties {
    fn output_schema() -> Value {
        json!({
            "type": "object",
            "required": ["author_property", "text_property"],
            "properties": {
                "author_property": {"type": "string"},
                "text_property": {"type": "string"}
            }
        })
    }

    fn validate(&self) -> Result<(), String> {
        for name in [&self.author_property, &self.text_property] {
            if !is_field_name(name) {
                return Err(format!("'{name}' is not a field name"));
            }
        }
        Ok(())
    }
}

pub struct HashtagAggregateTool {
    descriptor: ToolDescriptor,
}

impl HashtagAggregateTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "hashtag_aggregate",
                "Count the posts that contain a hashtag, grouped by author. \
                 Use when the user asks who posts about a hashtag or how often.",
            )
            .input(InputSpec::required(
                "hashtag",
                InputKind::String,
                "Hashtag to search for, with or without the leading '#'",
            ))
            .input(InputSpec::required(
                "collection",
                InputKind::String,
                "Collection holding the posts",
            ))
            .input(InputSpec::optional(
                "limit",
                InputKind::Count,
                Some(json!(DEFAULT_LIMIT)),
                "Maximum number of posts to scan",
            )),
        }
    }

    fn request(&self, ctx: &ToolContext, schema: &CollectionSchema, hashtag: &str) -> ReasoningRequest {
        ReasoningRequest::new(
            ReasoningTask::PropertySelection,
            "Pick the field that identifies a post's author and the field that holds the \
             post text, using only fields of this collection.",
        )
        .input("prompt", ctx.prompt.clone())
        .input("hashtag", hashtag)
        .input("schema", schema.prompt_view(3))
    }
}

impl Default for HashtagAggregateTool {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-author post counts, sorted by count descending.
fn count_by_author(records: &[Record], author: &str) -> Vec<GroupCount> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for record in records {
        let key = match record.get(author) {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    let mut groups: Vec<GroupCount> = counts
        .into_iter()
        .map(|(value, count)| GroupCount::new(value, count))
        .collect();
    let len = groups.len();
    sort_groups(&mut groups, len);
    groups
}

#[async_trait]
impl Tool for HashtagAggregateTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn is_available(&self, ctx: &ToolContext) -> bool {
        !ctx.routing.is_empty()
    }

    fn run<'a>(&'a self, ctx: &'a ToolContext, inputs: ToolInputs) -> ToolStream<'a> {
        tool_stream(async_stream::try_stream! {
            let hashtag = normalize_hashtag(inputs.str("hashtag")?);
            let collection = inputs.str("collection")?.to_string();
            let limit = inputs.usize("limit").unwrap_or(DEFAULT_LIMIT as usize);
            let schema = ctx
                .routing
                .schema(&collection)
                .ok_or_else(|| ToolError::UnknownCollection(collection.clone()))?;

            let props: HashtagProperties = ctx.ask(self.request(ctx, schema, &hashtag)).await?;
            yield ToolEvent::Status(format!("Searching for posts with {hashtag} in {collection}..."));

            let spec = QuerySpec::new(&collection)
                .filter(&props.text_property, FilterOp::Like, format!("*{hashtag}*"))
                .returning([props.author_property.clone(), props.text_property.clone()])
                .limit(limit);
            let execution = ctx.execute(&spec).await?;

            let author = match &execution.substitution {
                Some(sub) if sub.from == props.author_property => sub.to.clone(),
                _ => props.author_property.clone(),
            };
            let records = match execution.output {
                QueryOutput::Rows { records } => records,
                QueryOutput::Groups { .. } => Vec::new(),
            };
            let groups = count_by_author(&records, &author);
            yield ToolEvent::Status(format!(
                "Found {} posts from {} authors",
                records.len(),
                groups.len()
            ));
            tracing::debug!(tool = "hashtag_aggregate", hashtag = %hashtag, posts = records.len(), "hashtag counted");

            yield ToolEvent::Output(ToolOutput::Query {
                collection,
                output: QueryOutput::Groups {
                    field: author,
                    groups,
                    total: records.len() as u64,
                },
                substitution: execution.substitution,
            });
        })
    }
}
