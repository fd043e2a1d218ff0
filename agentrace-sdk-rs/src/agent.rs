pub mod tools;

use crate::agent::tools::ToolSpec;
use crate::error::{AgentError, ModelError, ToolError};
use crate::events::{ConversationState, Message, Role, ToolCallRequest, ToolOutcome, ToolResult};
use crate::llm::Model;
use crate::runtime::Runtime;
use crate::store::MessageStore;
use crate::telemetry::attributes as attr;
use crate::telemetry::{SpanContext, SpanRecorder};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub name: String,
    /// Maximum number of ACTION (tool) rounds per run; `None` means unbounded.
    ///
    /// The limit is detected when the model asks for one more round, so a run
    /// with `Some(k)` makes `k + 1` model calls before failing with
    /// [`AgentError::TurnLimitExceeded`]. The rejected assistant message is not
    /// appended.
    pub max_turns: Option<usize>,
    pub parallel_tool_execution: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "agent".to_string(),
            max_turns: Some(10),
            parallel_tool_execution: false,
        }
    }
}

/// States of the turn loop.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnState {
    /// Waiting on the model.
    Agent,
    /// Executing the tool calls of the last assistant message.
    Action(Vec<ToolCallRequest>),
    /// Terminal, carrying the final answer.
    End(String),
}

impl TurnState {
    /// Where to pick up a thread from its stored history.
    pub fn resume_from(state: &ConversationState) -> Self {
        match state.last() {
            Some(last) if last.role == Role::Assistant => match RoutingDecision::route(last) {
                RoutingDecision::Continue => TurnState::Action(last.tool_calls.clone()),
                RoutingDecision::End => TurnState::End(last.content.clone()),
            },
            _ => TurnState::Agent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    Continue,
    End,
}

impl RoutingDecision {
    pub fn route(message: &Message) -> Self {
        if message.has_tool_calls() {
            RoutingDecision::Continue
        } else {
            RoutingDecision::End
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub final_answer: String,
    pub agent_rounds: usize,
    pub action_rounds: usize,
}

/// Everything one run of the loop borrows from its caller.
pub struct TurnContext<'a> {
    pub thread_id: &'a str,
    pub store: &'a dyn MessageStore,
    pub recorder: &'a SpanRecorder,
    /// Span that model and tool spans are nested under.
    pub parent: SpanContext,
    pub cancel: &'a CancellationToken,
}

/// Drives the model/tool loop for one thread.
pub struct Agent {
    model: Arc<dyn Model>,
    runtime: Arc<dyn Runtime>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(model: Arc<dyn Model>, runtime: Arc<dyn Runtime>, config: AgentConfig) -> Self {
        Self {
            model,
            runtime,
            config,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Runs the state machine from `initial` until it reaches `End`.
    ///
    /// Every message is appended to the store as soon as it is complete; a
    /// failure or cancellation never leaves a half-written message behind.
    pub async fn run(
        &self,
        ctx: &TurnContext<'_>,
        initial: TurnState,
    ) -> Result<TurnOutcome, AgentError> {
        let tool_specs = self.runtime.tool_specs();
        let mut agent_rounds = 0;
        let mut action_rounds = 0;
        let mut state = initial;

        loop {
            state = match state {
                TurnState::Agent => {
                    agent_rounds += 1;
                    tracing::debug!(
                        thread_id = ctx.thread_id,
                        round = agent_rounds,
                        "AGENT: invoking {}",
                        self.model.model_name()
                    );
                    let message = self.invoke_model(ctx, &tool_specs).await?;

                    match RoutingDecision::route(&message) {
                        RoutingDecision::Continue => {
                            if let Some(limit) = self.config.max_turns {
                                if action_rounds >= limit {
                                    return Err(AgentError::TurnLimitExceeded { limit });
                                }
                            }
                            let calls = message.tool_calls.clone();
                            ctx.store.append(ctx.thread_id, message).await?;
                            TurnState::Action(calls)
                        }
                        RoutingDecision::End => {
                            let answer = message.content.clone();
                            ctx.store.append(ctx.thread_id, message).await?;
                            TurnState::End(answer)
                        }
                    }
                }
                TurnState::Action(calls) => {
                    action_rounds += 1;
                    tracing::debug!(
                        thread_id = ctx.thread_id,
                        round = action_rounds,
                        "ACTION: executing {} tool call(s)",
                        calls.len()
                    );
                    self.execute_tools(ctx, &calls).await?;
                    TurnState::Agent
                }
                TurnState::End(final_answer) => {
                    return Ok(TurnOutcome {
                        final_answer,
                        agent_rounds,
                        action_rounds,
                    });
                }
            };
        }
    }

    async fn invoke_model(
        &self,
        ctx: &TurnContext<'_>,
        tool_specs: &[ToolSpec],
    ) -> Result<Message, AgentError> {
        let history = ctx.store.load(ctx.thread_id).await?;

        let span = ctx
            .recorder
            .start_span(attr::model_span_name(self.model.model_name()), Some(&ctx.parent));
        span.set_attribute(attr::OPERATION_NAME, attr::OP_CHAT);
        span.set_attribute(attr::PROVIDER_NAME, self.model.provider());
        span.set_attribute(attr::REQUEST_MODEL, self.model.model_name());

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                span.mark_cancelled();
                span.end();
                return Err(AgentError::Cancelled);
            }
            result = self.model.invoke(&history.messages, tool_specs) => result,
        };

        match result.and_then(|message| validate_call_ids(&message).map(|()| message)) {
            Ok(message) => {
                span.set_attribute(attr::RESPONSE_TOOL_CALLS, message.tool_calls.len());
                let finish = match RoutingDecision::route(&message) {
                    RoutingDecision::Continue => "tool_calls",
                    RoutingDecision::End => "stop",
                };
                span.set_attribute(attr::RESPONSE_FINISH, finish);
                span.end();
                Ok(message)
            }
            Err(err) => {
                tracing::error!(thread_id = ctx.thread_id, "Model invocation failed: {}", err);
                span.set_attribute(attr::ERROR_TYPE, "model_invocation_failure");
                span.record_error(&err);
                span.end();
                Err(err.into())
            }
        }
    }

    /// Runs one ACTION round and appends its results in request order.
    async fn execute_tools(
        &self,
        ctx: &TurnContext<'_>,
        calls: &[ToolCallRequest],
    ) -> Result<(), AgentError> {
        let results: Vec<ToolResult> = if self.config.parallel_tool_execution {
            join_all(calls.iter().map(|call| self.execute_tool(ctx, call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute_tool(ctx, call).await);
            }
            results
        };

        let cancelled = results
            .iter()
            .any(|r| matches!(r.outcome, ToolOutcome::Failure(ToolError::Cancelled)));
        let messages = results.into_iter().map(Message::from).collect();
        ctx.store.append_all(ctx.thread_id, messages).await?;

        if cancelled {
            return Err(AgentError::Cancelled);
        }
        Ok(())
    }

    async fn execute_tool(&self, ctx: &TurnContext<'_>, call: &ToolCallRequest) -> ToolResult {
        let span = ctx
            .recorder
            .start_span(attr::tool_span_name(&call.tool_name), Some(&ctx.parent));
        span.set_attribute(attr::OPERATION_NAME, attr::OP_EXECUTE_TOOL);
        span.set_attribute(attr::TOOL_NAME, call.tool_name.as_str());
        span.set_attribute(attr::TOOL_CALL_ID, call.call_id.as_str());
        span.set_attribute(
            attr::TOOL_CALL_ARGUMENTS,
            attr::truncate(&call.arguments.to_string()),
        );

        let result = if ctx.cancel.is_cancelled() {
            ToolResult::failure(call, ToolError::Cancelled)
        } else {
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => ToolResult::failure(call, ToolError::Cancelled),
                result = self.runtime.execute(call) => result,
            }
        };

        match &result.outcome {
            ToolOutcome::Success(value) => {
                span.set_attribute(attr::TOOL_SUCCESS, true);
                let text = match value {
                    serde_json::Value::String(s) => attr::truncate(s),
                    other => attr::truncate(&other.to_string()),
                };
                span.set_attribute(attr::TOOL_CALL_RESULT, text);
            }
            ToolOutcome::Failure(err) => {
                tracing::warn!(
                    thread_id = ctx.thread_id,
                    call_id = call.call_id.as_str(),
                    "Tool {} failed: {}",
                    call.tool_name,
                    err
                );
                span.set_attribute(attr::TOOL_SUCCESS, false);
                span.set_attribute(attr::ERROR_TYPE, err.kind());
                span.set_attribute(attr::TOOL_CALL_RESULT, attr::truncate(&err.to_string()));
                if matches!(err, ToolError::Cancelled) {
                    span.mark_cancelled();
                } else {
                    span.record_error(err);
                }
            }
        }
        span.end();
        result
    }
}

/// Tool results are matched back to requests by `call_id`, so ids must be non-empty and unique.
fn validate_call_ids(message: &Message) -> Result<(), ModelError> {
    let mut seen = std::collections::HashSet::new();
    for call in &message.tool_calls {
        if call.call_id.is_empty() {
            return Err(ModelError::InvalidResponse(format!(
                "tool call to '{}' has an empty call_id",
                call.tool_name
            )));
        }
        if !seen.insert(call.call_id.as_str()) {
            return Err(ModelError::InvalidResponse(format!(
                "duplicate call_id '{}'",
                call.call_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::FnTool;
    use crate::error::ModelError;
    use crate::llm::ScriptedModel;
    use crate::runtime::LocalRuntime;
    use crate::store::InMemoryMessageStore;
    use crate::telemetry::{InMemorySpanSink, SpanStatus};
    use serde_json::json;

    fn tool_round(id: &str, name: &str) -> Message {
        Message::assistant_with_tools("", vec![ToolCallRequest::new(id, name, json!({}))])
    }

    fn runtime() -> Arc<LocalRuntime> {
        Arc::new(
            LocalRuntime::default()
                .with_tool(FnTool::new("get_current_date", "Today's date", |_| {
                    Ok(json!("2026-10-16"))
                }))
                .with_tool(FnTool::new("fail", "Always fails", |_| {
                    Err("backend down".to_string())
                })),
        )
    }

    struct Harness {
        store: InMemoryMessageStore,
        recorder: SpanRecorder,
        sink: InMemorySpanSink,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            let sink = InMemorySpanSink::new();
            Self {
                store: InMemoryMessageStore::new(),
                recorder: SpanRecorder::configure(sink.clone()),
                sink,
                cancel: CancellationToken::new(),
            }
        }

        async fn run(&self, agent: &Agent, initial: TurnState) -> Result<TurnOutcome, AgentError> {
            self.store.append("t1", Message::user("hi")).await.unwrap();
            let root = self.recorder.start_span("root", None);
            let ctx = TurnContext {
                thread_id: "t1",
                store: &self.store,
                recorder: &self.recorder,
                parent: root.context(),
                cancel: &self.cancel,
            };
            let result = agent.run(&ctx, initial).await;
            root.finish(&result);
            result
        }
    }

    #[test]
    fn test_routing_decision() {
        assert_eq!(
            RoutingDecision::route(&tool_round("c1", "get_current_date")),
            RoutingDecision::Continue
        );
        assert_eq!(
            RoutingDecision::route(&Message::assistant("done")),
            RoutingDecision::End
        );
    }

    #[test]
    fn test_resume_state_from_history() {
        let pending = tool_round("c1", "get_current_date");
        let state = ConversationState::new("t1", vec![Message::user("hi"), pending.clone()]);
        assert_eq!(
            TurnState::resume_from(&state),
            TurnState::Action(pending.tool_calls)
        );

        let done = ConversationState::new("t1", vec![Message::user("hi"), Message::assistant("bye")]);
        assert_eq!(TurnState::resume_from(&done), TurnState::End("bye".to_string()));

        let fresh = ConversationState::new("t1", vec![Message::user("hi")]);
        assert_eq!(TurnState::resume_from(&fresh), TurnState::Agent);
    }

    #[tokio::test]
    async fn test_n_tool_rounds_then_answer() {
        for n in 0..4 {
            let mut script: Vec<Message> = (0..n)
                .map(|i| tool_round(&format!("c{}", i), "get_current_date"))
                .collect();
            script.push(Message::assistant("It is 2026-10-16."));

            let harness = Harness::new();
            let agent = Agent::new(
                Arc::new(ScriptedModel::new(script)),
                runtime(),
                AgentConfig::default(),
            );
            let outcome = harness.run(&agent, TurnState::Agent).await.unwrap();

            assert_eq!(outcome.action_rounds, n);
            assert_eq!(outcome.agent_rounds, n + 1);
            assert_eq!(outcome.final_answer, "It is 2026-10-16.");
            // user + (assistant + tool) per round + final answer
            let state = harness.store.load("t1").await.unwrap();
            assert_eq!(state.messages.len(), 1 + 2 * n + 1);
        }
    }

    #[tokio::test]
    async fn test_turn_limit_is_deterministic() {
        let script: Vec<Message> = (0..5)
            .map(|i| tool_round(&format!("c{}", i), "get_current_date"))
            .collect();
        let harness = Harness::new();
        let model = Arc::new(ScriptedModel::new(script));
        let agent = Agent::new(
            model.clone(),
            runtime(),
            AgentConfig {
                max_turns: Some(2),
                ..AgentConfig::default()
            },
        );

        let err = harness.run(&agent, TurnState::Agent).await.unwrap_err();
        assert!(matches!(err, AgentError::TurnLimitExceeded { limit: 2 }));
        // Two allowed rounds plus the call that asked for a third.
        assert_eq!(model.invocations().len(), 3);

        // The rejected request is not stored, so the history stays well-formed.
        let state = harness.store.load("t1").await.unwrap();
        assert_eq!(state.messages.len(), 1 + 2 * 2);
        assert_eq!(state.messages.last().unwrap().role, Role::Tool);
    }

    #[tokio::test]
    async fn test_model_failure_is_recorded_and_propagated() {
        let harness = Harness::new();
        let model = ScriptedModel::new(vec![tool_round("c1", "get_current_date")])
            .then_fail(ModelError::Request("401 Unauthorized".to_string()))
            .with_identity("openai", "gpt-4o");
        let agent = Agent::new(Arc::new(model), runtime(), AgentConfig::default());

        let err = harness.run(&agent, TurnState::Agent).await.unwrap_err();
        assert!(matches!(err, AgentError::ModelInvocation(_)));

        let failed = harness
            .sink
            .find("chat gpt-4o")
            .into_iter()
            .find(|s| s.status == SpanStatus::Error)
            .unwrap();
        assert!(failed.exception.as_deref().unwrap().contains("401 Unauthorized"));
        assert_eq!(harness.sink.roots()[0].status, SpanStatus::Error);
    }

    #[tokio::test]
    async fn test_duplicate_call_ids_are_rejected() {
        let harness = Harness::new();
        let model = ScriptedModel::new(vec![Message::assistant_with_tools(
            "",
            vec![
                ToolCallRequest::new("c1", "get_current_date", json!({})),
                ToolCallRequest::new("c1", "get_current_date", json!({})),
            ],
        )])
        .with_identity("openai", "gpt-4o");
        let agent = Agent::new(Arc::new(model), runtime(), AgentConfig::default());

        let err = harness.run(&agent, TurnState::Agent).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ModelInvocation(ModelError::InvalidResponse(_))
        ));

        // Only the user message; no assistant message and no tool results.
        assert_eq!(harness.store.load("t1").await.unwrap().messages.len(), 1);
        assert!(harness.sink.find("execute_tool get_current_date").is_empty());
        let chat = &harness.sink.find("chat gpt-4o")[0];
        assert_eq!(chat.status, SpanStatus::Error);
        assert!(chat.exception.as_deref().unwrap().contains("duplicate call_id 'c1'"));
    }

    #[tokio::test]
    async fn test_empty_call_id_is_rejected() {
        let harness = Harness::new();
        let model = ScriptedModel::new(vec![tool_round("", "get_current_date")]);
        let agent = Agent::new(Arc::new(model), runtime(), AgentConfig::default());

        let err = harness.run(&agent, TurnState::Agent).await.unwrap_err();
        assert_eq!(err.kind(), "model_invocation_failure");
        assert_eq!(harness.store.load("t1").await.unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn test_tool_failure_does_not_abort_turn() {
        let harness = Harness::new();
        let model = Arc::new(ScriptedModel::new(vec![
            tool_round("c1", "fail"),
            Message::assistant("Sorry, the service is down."),
        ]));
        let agent = Agent::new(model.clone(), runtime(), AgentConfig::default());

        let outcome = harness.run(&agent, TurnState::Agent).await.unwrap();
        assert_eq!(outcome.final_answer, "Sorry, the service is down.");

        // The model saw the failure as a tool message.
        let second_history = &model.invocations()[1];
        let tool_message = second_history.last().unwrap();
        assert_eq!(tool_message.role, Role::Tool);
        assert!(tool_message.is_error);

        let tool_span = &harness.sink.find("execute_tool fail")[0];
        assert_eq!(tool_span.status, SpanStatus::Error);
        assert_eq!(
            tool_span.attribute(attr::TOOL_SUCCESS).and_then(|v| v.as_bool()),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_model_call_appends_nothing() {
        let harness = Harness::new();
        harness.cancel.cancel();
        let agent = Agent::new(
            Arc::new(ScriptedModel::new(vec![Message::assistant("never")])),
            runtime(),
            AgentConfig::default(),
        );

        let err = harness.run(&agent, TurnState::Agent).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(harness.store.load("t1").await.unwrap().messages.len(), 1);
        assert_eq!(harness.sink.find("chat replay")[0].status, SpanStatus::Cancelled);
    }
}
