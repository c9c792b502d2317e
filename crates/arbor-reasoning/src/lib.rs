//! Arbor Reasoning: the boundary to the language-model reasoning engine
//!
//! The engine is an untrusted, stateless inference call. Everything it
//! returns is text until it has been decoded into a typed output *and*
//! validated; only then may the rest of the system act on it.
//!
//! ```text
//!   caller ──► ReasoningRequest ──► ReasoningClient ──► dyn ReasoningEngine
//!                                       │   ▲                 │
//!                                       │   └── retry once ───┤ timeout /
//!                                       │                     │ malformed
//!                                       ▼                     ▼
//!                          T: StructuredOutput  ◄── decode + validate ◄── raw text
//! ```
//!
//! ## Failure classes
//!
//! - `Timeout`: the call exceeded its per-call deadline.
//! - `MalformedOutput`: the text did not decode into the expected type, or
//!   decoded but failed validation.
//!
//! Both are retried at most once by `ReasoningClient`, then surfaced.

pub mod client;
pub mod engines;
pub mod error;
pub mod output;
pub mod request;

#[cfg(feature = "openai")]
pub mod openai;

pub use client::{ReasoningClient, ReasoningConfig};
pub use engines::{FnEngine, ScriptedEngine};
pub use error::ReasoningError;
pub use output::{decode, StructuredOutput};
pub use request::{ReasoningRequest, ReasoningTask};

use async_trait::async_trait;

/// A reasoning engine: structured prompt in, raw text out.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "engine"
    }
}
