use agentrace_sdk_rs::events::ConversationState;
use agentrace_sdk_rs::store::Checkpoint;
use axum::{
    extract::{Path, State},
    response::Json,
};
use std::sync::Arc;

use crate::handlers::AppState;
use crate::models::{ApiError, CheckpointToken, MessageRequest, MessageResponse};

/// Runs one user turn on the thread, creating the thread if needed.
pub async fn submit_message(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Json(req): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".to_string()));
    }

    let outcome = state
        .runner
        .run_with_cancel(&thread_id, &req.content, state.shutdown.child_token())
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<ConversationState>, ApiError> {
    let history = state.runner.store().load(&thread_id).await?;
    Ok(Json(history))
}

/// Continues a thread from its stored history, e.g. after a restart or a restore.
pub async fn resume_thread(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let outcome = state
        .runner
        .resume(&thread_id, state.shutdown.child_token())
        .await?;
    Ok(Json(outcome.into()))
}

pub async fn create_checkpoint(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<CheckpointToken>, ApiError> {
    let checkpoint = state.runner.store().checkpoint(&thread_id).await?;
    tracing::info!(
        thread_id = thread_id.as_str(),
        checkpoint_id = %checkpoint.id(),
        "Checkpoint created"
    );
    Ok(Json(CheckpointToken {
        token: checkpoint.encode()?,
    }))
}

pub async fn restore_checkpoint(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CheckpointToken>,
) -> Result<Json<ConversationState>, ApiError> {
    let checkpoint = Checkpoint::decode(&req.token)?;
    let _lease = state.runner.store().lease(checkpoint.thread_id()).await;
    let restored = state.runner.store().restore(&checkpoint).await?;
    tracing::info!(
        thread_id = restored.thread_id.as_str(),
        messages = restored.messages.len(),
        "Thread restored from checkpoint"
    );
    Ok(Json(restored))
}
