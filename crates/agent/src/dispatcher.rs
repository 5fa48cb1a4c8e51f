//! ToolDispatcher: run one tool call against the registry.
//!
//! Anything that goes wrong inside a known tool (an error, a timeout, a
//! panic) comes back as a failure [`ToolResult`] for the model to read.
//! Only an unknown tool name is an `Err`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use turnstream_core::{ToolCall, ToolDefinition, ToolError, ToolRegistry, ToolResult};

/// Cheap to clone; clones share the registry and the concurrency limit.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    permits: Arc<Semaphore>,
}

impl ToolDispatcher {
    /// `concurrency` caps how many calls execute at once across all clones.
    pub fn new(registry: Arc<ToolRegistry>, concurrency: usize) -> Self {
        Self {
            registry,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    pub async fn dispatch(
        &self,
        call: &ToolCall,
        timeout: Duration,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;

        let Ok(_permit) = self.permits.acquire().await else {
            return Ok(ToolResult::failure(&call.id, "tool dispatcher is shut down"));
        };

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        let execution = AssertUnwindSafe(tool.execute(call.input.clone())).catch_unwind();

        let result = match tokio::time::timeout(timeout, execution).await {
            Ok(Ok(Ok(value))) => ToolResult::success(&call.id, value),
            Ok(Ok(Err(e))) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool failed");
                ToolResult::failure(&call.id, e.to_string())
            }
            Ok(Err(_panic)) => {
                let e = ToolError::ExecutionFailed {
                    tool_name: call.name.clone(),
                    reason: "tool panicked".into(),
                };
                warn!(tool = %call.name, call_id = %call.id, "Tool panicked");
                ToolResult::failure(&call.id, e.to_string())
            }
            Err(_) => {
                let e = ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                };
                warn!(tool = %call.name, call_id = %call.id, "Tool timed out");
                ToolResult::failure(&call.id, e.to_string())
            }
        };
        Ok(result)
    }
}
