use crate::agent::tools::{Tool, ToolSpec};
use crate::error::ToolError;
use crate::events::{ToolCallRequest, ToolResult};
use crate::runtime::Runtime;
use async_trait::async_trait;
use std::sync::Arc;

/// Runs registered tools in-process.
///
/// Each call runs on its own tokio task so a panicking tool is reported as a
/// failed result instead of tearing down the agent loop.
#[derive(Default, Clone)]
pub struct LocalRuntime {
    tools: Vec<Arc<dyn Tool>>,
}

impl LocalRuntime {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let mut runtime = Self::default();
        for tool in tools {
            runtime.register(tool);
        }
        runtime
    }

    /// Registers a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        let name = tool.name();
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == name) {
            tracing::warn!("Replacing already registered tool {}", name);
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name()).collect()
    }
}

#[async_trait]
impl Runtime for LocalRuntime {
    fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    async fn execute(&self, call: &ToolCallRequest) -> ToolResult {
        let Some(tool) = self
            .tools
            .iter()
            .find(|t| t.name() == call.tool_name)
            .cloned()
        else {
            return ToolResult::failure(
                call,
                ToolError::UnknownTool {
                    tool: call.tool_name.clone(),
                },
            );
        };

        let args = call.arguments.clone();
        let handle = tokio::spawn(async move { tool.call(args).await });
        // Abort the task if this future is dropped (cancellation).
        let abort = handle.abort_handle();
        let _guard = AbortOnDrop(abort);

        match handle.await {
            Ok(Ok(value)) => ToolResult::success(call, value),
            Ok(Err(message)) => ToolResult::failure(
                call,
                ToolError::ExecutionFailure {
                    tool: call.tool_name.clone(),
                    message,
                },
            ),
            Err(join_err) if join_err.is_cancelled() => {
                ToolResult::failure(call, ToolError::Cancelled)
            }
            Err(join_err) => ToolResult::failure(
                call,
                ToolError::ExecutionFailure {
                    tool: call.tool_name.clone(),
                    message: format!("tool panicked: {}", join_err),
                },
            ),
        }
    }
}

struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::{FnTool, GetActivitiesTool, GetCurrentDateTool};
    use crate::events::ToolOutcome;
    use serde_json::json;

    fn runtime() -> LocalRuntime {
        LocalRuntime::default()
            .with_tool(GetCurrentDateTool)
            .with_tool(GetActivitiesTool)
            .with_tool(FnTool::new("explode", "Always panics", |_| {
                panic!("boom");
            }))
            .with_tool(FnTool::new("fail", "Always fails", |_| {
                Err("service unavailable".to_string())
            }))
    }

    #[tokio::test]
    async fn test_execute_success() {
        let call = ToolCallRequest::new(
            "c1",
            "get_activities",
            json!({"city": "Seattle", "date": "2026-10-17"}),
        );
        let result = runtime().execute(&call).await;
        assert_eq!(result.call_id, "c1");
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_result() {
        let call = ToolCallRequest::new("c1", "book_flight", json!({}));
        let result = runtime().execute(&call).await;
        assert_eq!(
            result.outcome,
            ToolOutcome::Failure(ToolError::UnknownTool {
                tool: "book_flight".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_tool_error_and_panic_are_caught() {
        let failed = runtime()
            .execute(&ToolCallRequest::new("c1", "fail", json!({})))
            .await;
        assert!(matches!(
            failed.outcome,
            ToolOutcome::Failure(ToolError::ExecutionFailure { ref message, .. }) if message == "service unavailable"
        ));

        let panicked = runtime()
            .execute(&ToolCallRequest::new("c2", "explode", json!({})))
            .await;
        assert!(matches!(
            panicked.outcome,
            ToolOutcome::Failure(ToolError::ExecutionFailure { .. })
        ));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut runtime = LocalRuntime::default();
        runtime.register(Arc::new(GetCurrentDateTool));
        runtime.register(Arc::new(FnTool::new("get_current_date", "Fixed date", |_| {
            Ok(json!("2026-10-16"))
        })));
        assert_eq!(runtime.tool_names(), vec!["get_current_date".to_string()]);
        assert_eq!(runtime.tool_specs()[0].description, "Fixed date");
    }
}
