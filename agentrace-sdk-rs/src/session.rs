use crate::agent::{Agent, TurnContext, TurnOutcome, TurnState};
use crate::error::AgentError;
use crate::events::{Message, Role};
use crate::store::MessageStore;
use crate::telemetry::attributes as attr;
use crate::telemetry::{ActiveSpan, SpanRecorder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
    pub thread_id: String,
    pub final_answer: String,
    pub agent_rounds: usize,
    pub action_rounds: usize,
}

/// Top-level entry point: one root span per request, one writer per thread.
#[derive(Clone)]
pub struct SessionRunner {
    agent: Arc<Agent>,
    store: Arc<dyn MessageStore>,
    recorder: SpanRecorder,
}

impl SessionRunner {
    pub fn new(agent: Agent, store: Arc<dyn MessageStore>, recorder: SpanRecorder) -> Self {
        Self {
            agent: Arc::new(agent),
            store,
            recorder,
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn recorder(&self) -> &SpanRecorder {
        &self.recorder
    }

    pub async fn run(&self, thread_id: &str, user_text: &str) -> Result<SessionOutcome, AgentError> {
        self.run_with_cancel(thread_id, user_text, CancellationToken::new())
            .await
    }

    /// Seeds `user_text` and drives the thread until the model answers.
    ///
    /// The root span is closed before this returns, on every path. Failures are
    /// recorded on it and then returned unchanged.
    pub async fn run_with_cancel(
        &self,
        thread_id: &str,
        user_text: &str,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, AgentError> {
        let _lease = self.store.lease(thread_id).await;
        let root = self.start_root_span(thread_id, user_text);
        tracing::info!(thread_id, agent = self.agent.config().name.as_str(), "Session started");

        let result = async {
            self.store.append(thread_id, Message::user(user_text)).await?;
            self.drive(thread_id, &root, &cancel, TurnState::Agent).await
        }
        .await;

        self.close_root(root, thread_id, result)
    }

    /// Continues a stored thread without adding a user message.
    ///
    /// A thread whose last message is a final answer returns it without
    /// calling the model again.
    pub async fn resume(
        &self,
        thread_id: &str,
        cancel: CancellationToken,
    ) -> Result<SessionOutcome, AgentError> {
        let _lease = self.store.lease(thread_id).await;

        let state = match self.store.load(thread_id).await {
            Ok(state) => state,
            Err(err) => {
                let root = self.start_root_span(thread_id, "");
                return self.close_root(root, thread_id, Err(err.into()));
            }
        };
        let request = state
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let root = self.start_root_span(thread_id, request);
        let initial = TurnState::resume_from(&state);
        tracing::info!(thread_id, resume_from = ?initial, "Session resumed");

        let result = self.drive(thread_id, &root, &cancel, initial).await;
        self.close_root(root, thread_id, result)
    }

    async fn drive(
        &self,
        thread_id: &str,
        root: &ActiveSpan,
        cancel: &CancellationToken,
        initial: TurnState,
    ) -> Result<TurnOutcome, AgentError> {
        let ctx = TurnContext {
            thread_id,
            store: self.store.as_ref(),
            recorder: &self.recorder,
            parent: root.context(),
            cancel,
        };
        self.agent.run(&ctx, initial).await
    }

    fn start_root_span(&self, thread_id: &str, user_text: &str) -> ActiveSpan {
        let name = &self.agent.config().name;
        let model = self.agent.model();

        let root = self.recorder.start_span(attr::session_span_name(name), None);
        root.set_attribute(attr::OPERATION_NAME, attr::OP_INVOKE_AGENT);
        root.set_attribute(attr::AGENT_NAME, name.as_str());
        root.set_attribute(attr::THREAD_ID, thread_id);
        root.set_attribute(attr::USER_REQUEST, attr::truncate(user_text));
        root.set_attribute(attr::PROVIDER_NAME, model.provider());
        root.set_attribute(attr::REQUEST_MODEL, model.model_name());
        root
    }

    fn close_root(
        &self,
        root: ActiveSpan,
        thread_id: &str,
        result: Result<TurnOutcome, AgentError>,
    ) -> Result<SessionOutcome, AgentError> {
        match result {
            Ok(outcome) => {
                root.set_attribute(attr::REQUEST_SUCCESS, true);
                root.set_attribute(attr::AGENT_RESPONSE, attr::truncate(&outcome.final_answer));
                root.set_attribute(attr::AGENT_ACTION_ROUNDS, outcome.action_rounds);
                root.end();
                tracing::info!(
                    thread_id,
                    agent_rounds = outcome.agent_rounds,
                    action_rounds = outcome.action_rounds,
                    "Session finished"
                );
                Ok(SessionOutcome {
                    thread_id: thread_id.to_string(),
                    final_answer: outcome.final_answer,
                    agent_rounds: outcome.agent_rounds,
                    action_rounds: outcome.action_rounds,
                })
            }
            Err(err) => {
                root.set_attribute(attr::REQUEST_SUCCESS, false);
                root.set_attribute(attr::ERROR_TYPE, err.kind());
                if matches!(err, AgentError::Cancelled) {
                    tracing::warn!(thread_id, "Session cancelled");
                    root.mark_cancelled();
                } else {
                    tracing::error!(thread_id, "Session failed: {}", err);
                    root.record_error(&err);
                }
                root.end();
                Err(err)
            }
        }
    }
}
