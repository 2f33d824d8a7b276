//! Tool executor that dispatches tool calls to registered tools.
//!
//! Every call yields a [`ToolResult`]: unknown tools, handler errors,
//! panics and timeouts become error payloads instead of aborting the turn.
//! Concurrent dispatch runs each call on its own task, bounded by a worker
//! semaphore, and hands results back in request order. A call's deadline
//! is fixed when it is submitted, so queueing for a worker uses its budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::tool::{MAX_TOOL_ARGS_LEN, ToolCall, ToolDefinition, ToolRegistry, ToolResult, prepare_arguments};
use crate::error::RagError;

/// Default per-tool timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);
/// Default number of concurrent tool workers.
pub const DEFAULT_MAX_WORKERS: usize = 3;

/// The orchestrator's tool port.
///
/// Implemented by [`ToolExecutor`] and by the tracking wrapper.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Definitions offered to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Executes one call in the current task.
    async fn execute(&self, call: &ToolCall) -> ToolResult;

    /// Executes calls concurrently; results are returned in `calls` order.
    async fn execute_concurrently(&self, calls: &[ToolCall]) -> Vec<ToolResult>;
}

/// Executes tool calls against a frozen [`ToolRegistry`].
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    max_workers: usize,
}

impl ToolExecutor {
    /// Creates an executor with the default timeout and worker count.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }

    /// Sets the per-tool timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the concurrent worker bound (minimum 1).
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// The registry this executor dispatches to.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Invokes a tool by name with already-parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::UnknownTool`] for unregistered names and
    /// propagates handler errors.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<Value, RagError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| RagError::UnknownTool {
                name: name.to_string(),
            })?;
        tool.call(arguments).await
    }

    /// Runs one call with argument preparation, abandoning it at `deadline`.
    async fn run_call(registry: &ToolRegistry, call: &ToolCall, deadline: Instant, timeout: Duration) -> ToolResult {
        if call.arguments.len() > MAX_TOOL_ARGS_LEN {
            return ToolResult::failed(
                call,
                &RagError::InvalidToolArguments {
                    name: call.name.clone(),
                    message: format!(
                        "tool arguments too large ({} bytes, max {MAX_TOOL_ARGS_LEN})",
                        call.arguments.len()
                    ),
                },
            );
        }

        let Some(tool) = registry.get(&call.name) else {
            return ToolResult::failed(
                call,
                &RagError::UnknownTool {
                    name: call.name.clone(),
                },
            );
        };

        let schema = tool.definition().parameters;
        let arguments = prepare_arguments(&call.name, &call.arguments, &schema);

        match tokio::time::timeout_at(deadline, tool.call(arguments)).await {
            Ok(Ok(payload)) => ToolResult::ok(call, payload),
            Ok(Err(e)) => ToolResult::failed(call, &e),
            Err(_) => Self::timed_out(call, timeout),
        }
    }

    fn timed_out(call: &ToolCall, timeout: Duration) -> ToolResult {
        ToolResult::failed(
            call,
            &RagError::ToolTimeout {
                name: call.name.clone(),
                timeout_secs: timeout.as_secs(),
            },
        )
    }
}

#[async_trait]
impl ToolDispatcher for ToolExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions().to_vec()
    }

    async fn execute(&self, call: &ToolCall) -> ToolResult {
        let deadline = Instant::now() + self.timeout;
        let result = Self::run_call(&self.registry, call, deadline, self.timeout).await;
        debug!(
            tool = call.name,
            call_id = call.id,
            success = result.success,
            "tool execution complete"
        );
        result
    }

    async fn execute_concurrently(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, ToolResult)>();
        let mut handles = Vec::with_capacity(calls.len());

        for (index, call) in calls.iter().enumerate() {
            let sem = Arc::clone(&semaphore);
            let registry = Arc::clone(&self.registry);
            let tx = tx.clone();
            let call = call.clone();
            let timeout = self.timeout;
            // Waiting for a worker counts against the call's own budget.
            let deadline = Instant::now() + timeout;

            handles.push(tokio::spawn(async move {
                let result = match tokio::time::timeout_at(deadline, sem.acquire()).await {
                    Ok(Ok(_permit)) => Self::run_call(&registry, &call, deadline, timeout).await,
                    Ok(Err(e)) => ToolResult::failed(&call, &RagError::tool(&call.name, e.to_string())),
                    Err(_) => Self::timed_out(&call, timeout),
                };
                // Receiver outlives every task; a send failure means the
                // collector is gone and the result has nowhere to go.
                let _ = tx.send((index, result));
            }));
        }
        drop(tx);

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!(error = %e, "tool task join failed");
            }
        }

        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        while let Some((index, result)) = rx.recv().await {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(result);
            }
        }

        calls
            .iter()
            .zip(slots)
            .map(|(call, slot)| match slot {
                Some(result) if result.tool_call_id == call.id => {
                    debug!(
                        tool = call.name,
                        call_id = call.id,
                        success = result.success,
                        "tool execution complete"
                    );
                    result
                }
                _ => ToolResult::failed(call, &RagError::tool(&call.name, "tool task terminated abnormally")),
            })
            .collect()
    }
}
