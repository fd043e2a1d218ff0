use crate::agent::tools::ToolSpec;
use crate::events::{ToolCallRequest, ToolResult};
use async_trait::async_trait;

#[async_trait]
/// Executes tool-call requests on behalf of the agent.
///
/// The Runtime owns the registered tool capabilities and exposes their
/// declarations to the model. It decouples the agent's decision-making from
/// where and how tools actually run.
pub trait Runtime: Send + Sync {
    /// Declarations of every tool the model may call.
    fn tool_specs(&self) -> Vec<ToolSpec>;

    /// Execute one tool call.
    ///
    /// Never fails: unknown tools and tool errors come back as a
    /// [`ToolResult`] carrying a failure, so the model can react to them.
    async fn execute(&self, call: &ToolCallRequest) -> ToolResult;
}

pub mod local;
pub use local::LocalRuntime;
