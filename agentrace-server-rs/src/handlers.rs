use agentrace_sdk_rs::{
    agent::tools::{GetActivitiesTool, GetCurrentDateTool, GetWeatherTool},
    agent::Agent,
    config::{AppConfig, TelemetrySinkKind},
    llm::LLM,
    prompts::WEEKEND_PLANNER_INSTRUCTIONS,
    runtime::LocalRuntime,
    session::SessionRunner,
    store::{FileMessageStore, InMemoryMessageStore, MessageStore},
    telemetry::{LogSpanSink, SpanRecorder},
};
use axum::response::{IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub runner: SessionRunner,
    /// Cancelled on shutdown; every in-flight session runs under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(runner: SessionRunner) -> Self {
        Self {
            runner,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wires the weekend planner agent from configuration.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let llm = LLM::new(config.llm.clone()).with_instructions(WEEKEND_PLANNER_INSTRUCTIONS);
        let runtime = LocalRuntime::default()
            .with_tool(GetWeatherTool::new())
            .with_tool(GetActivitiesTool)
            .with_tool(GetCurrentDateTool);
        let agent = Agent::new(Arc::new(llm), Arc::new(runtime), config.agent.clone());

        let store: Arc<dyn MessageStore> = match &config.store_dir {
            Some(dir) => {
                tracing::info!("Persisting threads under {}", dir.display());
                Arc::new(FileMessageStore::open(dir.clone()).await?)
            }
            None => Arc::new(InMemoryMessageStore::new()),
        };

        let recorder = match config.telemetry_sink {
            TelemetrySinkKind::Log => SpanRecorder::configure(LogSpanSink),
            TelemetrySinkKind::None => SpanRecorder::noop(),
        };

        Ok(Self::new(SessionRunner::new(agent, store, recorder)))
    }
}

pub async fn health() -> impl IntoResponse {
    "OK"
}

pub async fn alive() -> impl IntoResponse {
    Json(json!({
        "status": "ok"
    }))
}
