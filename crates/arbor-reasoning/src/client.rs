//! Reasoning client: per-call timeout, typed decoding, one bounded retry.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ReasoningError;
use crate::output::{decode, StructuredOutput};
use crate::request::ReasoningRequest;
use crate::ReasoningEngine;

/// Configuration for calls into the reasoning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Per-call deadline.
    pub timeout_ms: u64,
    /// Retry once on `Timeout` / `MalformedOutput`.
    pub retry_once: bool,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            retry_once: true,
        }
    }
}

/// Cheap-to-clone handle over a shared engine.
#[derive(Clone)]
pub struct ReasoningClient {
    engine: Arc<dyn ReasoningEngine>,
    config: ReasoningConfig,
}

impl ReasoningClient {
    pub fn new(engine: Arc<dyn ReasoningEngine>, config: ReasoningConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &ReasoningConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    async fn attempt<T: StructuredOutput>(&self, request: &ReasoningRequest) -> Result<T, ReasoningError> {
        let limit = Duration::from_millis(self.config.timeout_ms);
        let raw = match tokio::time::timeout(limit, self.engine.complete(request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ReasoningError::Timeout {
                    after_ms: self.config.timeout_ms,
                })
            }
        };
        decode(&raw)
    }

    /// Ask the engine for a `T`.
    ///
    /// Timeouts and malformed output are retried at most once; provider
    /// errors are returned as-is.
    pub async fn ask<T: StructuredOutput>(
        &self,
        mut request: ReasoningRequest,
    ) -> Result<T, ReasoningError> {
        if request.output_schema.is_null() {
            request.output_schema = T::output_schema();
        }

        match self.attempt::<T>(&request).await {
            Err(err) if err.is_retryable() && self.config.retry_once => {
                tracing::warn!(
                    engine = %self.engine.name(),
                    task = %request.task,
                    error = %err,
                    "reasoning call failed, retrying once"
                );
                self.attempt::<T>(&request).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::{FnEngine, ScriptedEngine};
    use crate::request::ReasoningTask;
    use serde::Deserialize;
    use serde_json::{json, Value};

    #[derive(Debug, Deserialize)]
    struct Answer {
        text: String,
    }

    impl StructuredOutput for Answer {
        fn output_schema() -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
    }

    fn request() -> ReasoningRequest {
        ReasoningRequest::new(ReasoningTask::Summary, "answer")
    }

    #[tokio::test]
    async fn test_malformed_output_retried_once() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push(ReasoningTask::Summary, "not json");
        engine.push(ReasoningTask::Summary, r#"{"text": "ok"}"#);
        let client = ReasoningClient::new(engine.clone(), ReasoningConfig::default());

        let answer: Answer = client.ask(request()).await.unwrap();
        assert_eq!(answer.text, "ok");
        assert_eq!(engine.requests().len(), 2);
        assert!(!engine.requests()[0].output_schema.is_null());
    }

    #[tokio::test]
    async fn test_second_failure_surfaces() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push(ReasoningTask::Summary, "nope");
        engine.push(ReasoningTask::Summary, "still nope");
        engine.push(ReasoningTask::Summary, r#"{"text": "never reached"}"#);
        let client = ReasoningClient::new(engine.clone(), ReasoningConfig::default());

        let err = client.ask::<Answer>(request()).await.unwrap_err();
        assert!(matches!(err, ReasoningError::MalformedOutput(_)));
        assert_eq!(engine.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_provider_error_not_retried() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.push_error(ReasoningTask::Summary, ReasoningError::Provider("down".into()));
        let client = ReasoningClient::new(engine.clone(), ReasoningConfig::default());

        let err = client.ask::<Answer>(request()).await.unwrap_err();
        assert_eq!(err, ReasoningError::Provider("down".into()));
        assert_eq!(engine.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let engine = Arc::new(
            FnEngine::new(|_| Ok(r#"{"text": "late"}"#.to_string()))
                .with_delay(Duration::from_millis(200)),
        );
        let client = ReasoningClient::new(
            engine,
            ReasoningConfig {
                timeout_ms: 10,
                retry_once: true,
            },
        );
        let err = client.ask::<Answer>(request()).await.unwrap_err();
        assert_eq!(err, ReasoningError::Timeout { after_ms: 10 });
    }
}
