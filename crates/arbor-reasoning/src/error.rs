use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReasoningError {
    #[error("reasoning engine timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Output did not decode into the expected shape or failed validation.
    #[error("malformed reasoning output: {0}")]
    MalformedOutput(String),

    #[error("reasoning engine error: {0}")]
    Provider(String),
}

impl ReasoningError {
    /// Failure classes the client retries once.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReasoningError::Timeout { .. } | ReasoningError::MalformedOutput(_)
        )
    }
}
