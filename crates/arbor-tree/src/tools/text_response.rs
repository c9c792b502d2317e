//! `text_response`: terminal tool that writes the answer from what earlier
//! steps collected.

use arbor_reasoning::{ReasoningRequest, ReasoningTask, StructuredOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::tool::{tool_stream, Tool, ToolDescriptor, ToolEvent, ToolInputs, ToolOutput, ToolStream};

#[derive(Debug, Clone, Deserialize)]
struct TextAnswer {
    text: String,
}

impl StructuredOutput for TextAnswer {
    fn output_schema() -> Value {
        json!({
            "type": "object",
            "required": ["text"],
            "properties": {"text": {"type": "string"}}
        })
    }

    fn validate(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("empty answer".to_string());
        }
        Ok(())
    }
}

pub struct TextResponseTool {
    descriptor: ToolDescriptor,
}

impl TextResponseTool {
    pub fn new() -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                "text_response",
                "Answer the user in plain text from the results gathered so far. \
                 Ends the request.",
            )
            .terminal(),
        }
    }
}

impl Default for TextResponseTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextResponseTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn run<'a>(&'a self, ctx: &'a ToolContext, _inputs: ToolInputs) -> ToolStream<'a> {
        tool_stream(async_stream::try_stream! {
            let request = ReasoningRequest::new(
                ReasoningTask::Summary,
                "Answer the user's request using only the previous results. \
                 Say so plainly when they hold nothing relevant.",
            )
            .input("prompt", ctx.prompt.clone())
            .input("previous_results", Value::Array(ctx.previous_summaries()));
            let answer: TextAnswer = ctx.ask(request).await?;
            yield ToolEvent::Output(ToolOutput::Text { text: answer.text });
        })
    }
}
