use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that end a session. Tool-level faults never show up here: they are
/// turned into tool messages the model can react to.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model invocation failed: {0}")]
    ModelInvocation(#[from] ModelError),

    #[error("turn limit exceeded: model kept requesting tools after {limit} rounds")]
    TurnLimitExceeded { limit: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session cancelled")]
    Cancelled,
}

impl AgentError {
    /// Short, stable name recorded as `error.type` on spans.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::ModelInvocation(_) => "model_invocation_failure",
            AgentError::TurnLimitExceeded { .. } => "turn_limit_exceeded",
            AgentError::Store(StoreError::UnknownThread(_)) => "unknown_thread",
            AgentError::Store(StoreError::NotFound(_)) => "not_found",
            AgentError::Store(_) => "store_failure",
            AgentError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Append on a store that requires registration, for an unregistered thread.
    #[error("unknown thread: {0}")]
    UnknownThread(String),

    #[error("thread not found: {0}")]
    NotFound(String),

    #[error("invalid thread id: {0}")]
    InvalidThreadId(String),

    #[error("invalid checkpoint token: {0}")]
    InvalidCheckpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolError {
    #[error("unknown tool: {tool}")]
    UnknownTool { tool: String },

    #[error("tool {tool} failed: {message}")]
    ExecutionFailure { tool: String, message: String },

    #[error("tool execution cancelled")]
    Cancelled,
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::UnknownTool { .. } => "unknown_tool",
            ToolError::ExecutionFailure { .. } => "tool_execution_failure",
            ToolError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Backend unreachable, rejected the request, or nothing left to replay.
    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
