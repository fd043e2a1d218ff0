use agentrace_sdk_rs::error::{AgentError, StoreError};
use agentrace_sdk_rs::session::SessionOutcome;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageResponse {
    pub thread_id: String,
    pub response: String,
    pub agent_rounds: usize,
    pub action_rounds: usize,
}

impl From<SessionOutcome> for MessageResponse {
    fn from(outcome: SessionOutcome) -> Self {
        Self {
            thread_id: outcome.thread_id,
            response: outcome.final_answer,
            agent_rounds: outcome.agent_rounds,
            action_rounds: outcome.action_rounds,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckpointToken {
    pub token: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("thread not found: {0}")]
    ThreadNotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    Agent(AgentError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::ThreadNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Agent(AgentError::ModelInvocation(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Agent(AgentError::TurnLimitExceeded { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::Agent(AgentError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Agent(AgentError::Store(_)) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::ThreadNotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Agent(err) => err.kind(),
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        let body = Json(serde_json::json!({ "error": self.to_string(), "kind": self.kind() }));
        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let message = e.to_string();
        match e {
            StoreError::NotFound(id) | StoreError::UnknownThread(id) => ApiError::ThreadNotFound(id),
            StoreError::InvalidThreadId(_) | StoreError::InvalidCheckpoint(_) => {
                ApiError::BadRequest(message)
            }
            _ => ApiError::Internal(message),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Store(store) => store.into(),
            other => ApiError::Agent(other),
        }
    }
}
