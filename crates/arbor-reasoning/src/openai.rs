//! OpenAI-compatible chat-completions engine.
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (OpenAI, Azure-style gateways, local servers).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::ReasoningError;
use crate::request::ReasoningRequest;
use crate::ReasoningEngine;

/// Engine configuration loaded from environment or config file.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    /// Read `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, ReasoningError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            ReasoningError::Provider("no engine configured, set OPENAI_API_KEY".to_string())
        })?;
        Ok(Self {
            api_key,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            timeout_secs: 60,
        })
    }
}

pub struct OpenAiEngine {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiEngine {
    pub fn new(config: OpenAiConfig) -> Result<Self, ReasoningError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReasoningError::Provider(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "temperature": 0.0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": format!(
                    "Task: {}. Respond only with JSON matching: {}",
                    request.task, request.output_schema
                )},
                {"role": "user", "content": request.render()},
            ],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReasoningError::Timeout {
                        after_ms: self.config.timeout_secs * 1_000,
                    }
                } else {
                    ReasoningError::Provider(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ReasoningError::Provider(format!("HTTP {status}: {text}")));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::MalformedOutput(e.to_string()))?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ReasoningError::MalformedOutput("response has no message content".to_string()))
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
