use crate::job::Job;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure raised by job logic
///
/// Reported to the server as `work_fail`; never affects the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
}

impl JobError {
    pub fn new(message: impl Into<String>) -> Self {
        JobError {
            message: message.into(),
        }
    }
}

/// Result type for job handlers
pub type JobResult = Result<Value, JobError>;

/// Logic for one job type
///
/// `arg` is the decoded job argument. The returned value is reported as the
/// job result; anything that is not an object or array is wrapped as
/// `{"result": value}` first.
///
/// A failed [`Job::status`] call does not have to fail the job. A broken
/// connection is evicted by the worker at its next grab.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, arg: Value, job: &mut Job<'_>) -> JobResult;
}

/// Adapter so plain functions can serve as handlers
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> JobHandler for FnHandler<F>
where
    F: Fn(Value) -> JobResult + Send + Sync,
{
    async fn run(&self, arg: Value, _job: &mut Job<'_>) -> JobResult {
        (self.0)(arg)
    }
}

/// Handlers by job type
pub struct JobRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        JobRegistry {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn register<H: JobHandler + 'static>(&self, function: impl Into<String>, handler: H) {
        let mut handlers = self.handlers.write();
        handlers.insert(function.into(), Arc::new(handler));
    }

    pub fn register_fn<F>(&self, function: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> JobResult + Send + Sync + 'static,
    {
        self.register(function, FnHandler(handler));
    }

    pub fn get(&self, function: &str) -> Option<Arc<dyn JobHandler>> {
        let handlers = self.handlers.read();
        handlers.get(function).cloned()
    }

    pub fn has_handler(&self, function: &str) -> bool {
        let handlers = self.handlers.read();
        handlers.contains_key(function)
    }

    /// Registered job types, sorted
    pub fn functions(&self) -> Vec<String> {
        let handlers = self.handlers.read();
        let mut functions: Vec<String> = handlers.keys().cloned().collect();
        functions.sort();
        functions
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reverses a string argument, reporting progress per character
pub struct ReverseHandler;

#[async_trait]
impl JobHandler for ReverseHandler {
    async fn run(&self, arg: Value, job: &mut Job<'_>) -> JobResult {
        let text = match arg {
            Value::String(text) => text,
            other => return Err(JobError::new(format!("Expected a string, got {}", other))),
        };

        let total = text.chars().count() as u64;
        let mut reversed = String::with_capacity(text.len());
        for (done, c) in text.chars().rev().enumerate() {
            reversed.push(c);
            if let Err(e) = job.status(done as u64 + 1, total).await {
                debug!(
                    server = job.server(),
                    function = job.function(),
                    "Status update not delivered: {}", e
                );
            }
        }

        Ok(Value::String(reversed))
    }
}

/// Returns its argument unchanged
pub struct EchoHandler;

#[async_trait]
impl JobHandler for EchoHandler {
    async fn run(&self, arg: Value, _job: &mut Job<'_>) -> JobResult {
        Ok(arg)
    }
}
