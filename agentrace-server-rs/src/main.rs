mod handlers;
mod models;
mod threads_api;

use crate::handlers::AppState;
use agentrace_sdk_rs::config::AppConfig;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use threads_api::{create_checkpoint, get_messages, restore_checkpoint, resume_thread, submit_message};
use tokio::net::TcpListener;

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/alive", get(handlers::alive))
        // Thread Routes
        .route(
            "/api/threads/{id}/messages",
            post(submit_message).get(get_messages),
        )
        .route("/api/threads/{id}/resume", post(resume_thread))
        .route("/api/threads/{id}/checkpoints", post(create_checkpoint))
        .route("/api/checkpoints/restore", post(restore_checkpoint))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Set up tracing using the SDK's logger
    agentrace_sdk_rs::logger::init_logging();

    let config = AppConfig::from_env()?;
    let state = Arc::new(AppState::from_config(&config).await?);

    let listener = TcpListener::bind(&config.server_addr).await?;
    tracing::info!(
        agent = config.agent.name.as_str(),
        model = config.llm.model.as_str(),
        "Listening on {}",
        listener.local_addr()?
    );

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down, cancelling in-flight sessions");
            shutdown.cancel();
        })
        .await?;

    state.runner.recorder().shutdown();
    Ok(())
}
