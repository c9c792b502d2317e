//! Typed, validated decoding of engine output.
//!
//! Engines wrap JSON in prose or markdown fences more often than not. The
//! decoder extracts the first JSON object, decodes it into the target type
//! (unknown variants and missing fields are rejected by serde), then runs the
//! type's own validation.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ReasoningError;

/// An output type the engine may be asked to produce.
pub trait StructuredOutput: DeserializeOwned + Send {
    /// JSON schema hint included in the prompt.
    fn output_schema() -> Value;

    /// Semantic checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

fn fenced_block() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok())
        .as_ref()
}

/// Pull the JSON object out of raw engine text.
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return Some(trimmed);
    }
    if let Some(captures) = fenced_block().and_then(|re| re.captures(trimmed)) {
        if let Some(body) = captures.get(1) {
            return Some(body.as_str());
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// Decode and validate raw engine output.
pub fn decode<T: StructuredOutput>(raw: &str) -> Result<T, ReasoningError> {
    let json = extract_json(raw)
        .ok_or_else(|| ReasoningError::MalformedOutput("no JSON object in output".to_string()))?;
    let value: T = serde_json::from_str(json)
        .map_err(|e| ReasoningError::MalformedOutput(e.to_string()))?;
    value.validate().map_err(ReasoningError::MalformedOutput)?;
    Ok(value)
}
