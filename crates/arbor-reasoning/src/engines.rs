//! Deterministic engines for tests and offline runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::ReasoningError;
use crate::request::{ReasoningRequest, ReasoningTask};
use crate::ReasoningEngine;

// ============================================================================
// Scripted Engine
// ============================================================================

/// Replays queued responses per task, in order, and records every request.
#[derive(Default)]
pub struct ScriptedEngine {
    queues: Mutex<HashMap<ReasoningTask, VecDeque<Result<String, ReasoningError>>>>,
    log: Mutex<Vec<ReasoningRequest>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: ReasoningTask, response: impl Into<String>) {
        self.queues
            .lock()
            .entry(task)
            .or_default()
            .push_back(Ok(response.into()));
    }

    pub fn push_json(&self, task: ReasoningTask, response: Value) {
        self.push(task, response.to_string());
    }

    pub fn push_error(&self, task: ReasoningTask, error: ReasoningError) {
        self.queues
            .lock()
            .entry(task)
            .or_default()
            .push_back(Err(error));
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.log.lock().clone()
    }

    pub fn remaining(&self, task: &ReasoningTask) -> usize {
        self.queues.lock().get(task).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        self.log.lock().push(request.clone());
        self.queues
            .lock()
            .get_mut(&request.task)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(ReasoningError::Provider(format!(
                    "no scripted response for task '{}'",
                    request.task
                )))
            })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// Closure Engine
// ============================================================================

type Responder = dyn Fn(&ReasoningRequest) -> Result<String, ReasoningError> + Send + Sync;

/// Answers with a closure over the request; optionally sleeps first.
#[derive(Clone)]
pub struct FnEngine {
    responder: Arc<Responder>,
    delay: Option<Duration>,
}

impl FnEngine {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ReasoningRequest) -> Result<String, ReasoningError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ReasoningEngine for FnEngine {
    async fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.responder)(request)
    }

    fn name(&self) -> &str {
        "fn"
    }
}
