use crate::agent::tools::ToolSpec;
use crate::error::ModelError;
use crate::events::{Message, Role, ToolCallRequest};
use async_trait::async_trait;
use genai::Client;
use genai::chat::{ChatMessage, ChatRequest, ChatRole, ContentPart, ToolCall, ToolResponse};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// The language-model backend, seen as an opaque capability.
#[async_trait]
pub trait Model: Send + Sync {
    /// Provider identity recorded on spans (e.g. "openai").
    fn provider(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Produce the next assistant message: a final answer, or tool-call requests.
    async fn invoke(&self, history: &[Message], tools: &[ToolSpec]) -> Result<Message, ModelError>;
}

#[derive(Deserialize, Clone, Debug)]
pub struct LLMConfig {
    pub provider: String,
    pub model: String,
    pub api_key: Option<String>,
}

/// [`Model`] backed by the `genai` multi-provider client.
#[derive(Clone)]
pub struct LLM {
    pub provider: String,
    pub model: String,
    pub client: Client,
    pub api_key: Option<String>,
    pub instructions: Option<String>,
}

impl LLM {
    pub fn new(config: LLMConfig) -> Self {
        let client = match config.api_key.clone() {
            // An explicit key is attached per request; the process environment is left alone.
            Some(key) => Client::builder()
                .with_service_target_resolver_fn(move |mut t: genai::ServiceTarget| {
                    t.auth = genai::resolver::AuthData::from_single(key.clone());
                    Ok(t)
                })
                .build(),
            None => Client::default(),
        };
        Self {
            provider: config.provider,
            model: config.model,
            client,
            api_key: config.api_key,
            instructions: None,
        }
    }

    /// System instructions sent ahead of every history.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    fn to_chat_messages(&self, history: &[Message]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(instructions) = &self.instructions {
            messages.push(ChatMessage::system(instructions.clone()));
        }

        for message in history {
            match message.role {
                Role::User => messages.push(ChatMessage::user(message.content.clone())),
                Role::Assistant if message.tool_calls.is_empty() => {
                    messages.push(ChatMessage::assistant(message.content.clone()))
                }
                Role::Assistant => {
                    let mut parts = vec![];
                    if !message.content.is_empty() {
                        parts.push(ContentPart::Text(message.content.clone()));
                    }
                    for call in &message.tool_calls {
                        parts.push(ContentPart::ToolCall(ToolCall {
                            call_id: call.call_id.clone(),
                            fn_name: call.tool_name.clone(),
                            fn_arguments: call.arguments.clone(),
                        }));
                    }
                    messages.push(ChatMessage {
                        role: ChatRole::Assistant,
                        content: parts.into(),
                        options: None,
                    });
                }
                Role::Tool => messages.push(ChatMessage::from(ToolResponse::new(
                    message.tool_call_id.clone().unwrap_or_default(),
                    message.content.clone(),
                ))),
            }
        }
        messages
    }
}

#[async_trait]
impl Model for LLM {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, history: &[Message], tools: &[ToolSpec]) -> Result<Message, ModelError> {
        let mut chat_req = ChatRequest::new(self.to_chat_messages(history));
        if !tools.is_empty() {
            let genai_tools: Vec<genai::chat::Tool> = tools
                .iter()
                .map(|t| genai::chat::Tool {
                    name: t.name.clone(),
                    description: Some(t.description.clone()),
                    schema: Some(t.parameters.clone()),
                    config: None,
                })
                .collect();
            chat_req = chat_req.with_tools(genai_tools);
        }

        let output = self
            .client
            .exec_chat(&self.model, chat_req, None)
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let text: String = output.content.texts().join("");
        let tool_calls: Vec<ToolCallRequest> = output
            .tool_calls()
            .iter()
            .map(|t| ToolCallRequest::new(t.call_id.clone(), t.fn_name.clone(), t.fn_arguments.clone()))
            .collect();

        Ok(Message::assistant_with_tools(text, tool_calls))
    }
}

/// Replays queued assistant messages in order. Used for offline runs and tests.
pub struct ScriptedModel {
    provider: String,
    model: String,
    script: Mutex<VecDeque<Result<Message, ModelError>>>,
    invocations: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = Message>) -> Self {
        Self {
            provider: "scripted".to_string(),
            model: "replay".to_string(),
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_identity(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = provider.into();
        self.model = model.into();
        self
    }

    /// Queues a failure to be returned by the next unanswered invocation.
    pub fn then_fail(self, error: ModelError) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Err(error));
        self
    }

    /// Histories seen by each invocation, oldest first.
    pub fn invocations(&self) -> Vec<Vec<Message>> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, history: &[Message], _tools: &[ToolSpec]) -> Result<Message, ModelError> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(history.to_vec());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Request("script exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_llm_instantiation() {
        let config = LLMConfig {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key: Some("test-key".to_string()),
        };
        let llm = LLM::new(config).with_instructions("You help users plan their weekends.");
        assert_eq!(llm.model_name(), "gpt-4o");
        assert_eq!(llm.provider(), "openai");
        assert_eq!(llm.api_key, Some("test-key".to_string()));
    }

    #[test]
    fn test_api_key_stays_out_of_the_environment() {
        let before = std::env::var("GROQ_API_KEY").ok();
        let llm = LLM::new(LLMConfig {
            provider: "groq".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key: Some("per-client-key".to_string()),
        });
        assert_eq!(llm.api_key.as_deref(), Some("per-client-key"));
        assert_eq!(std::env::var("GROQ_API_KEY").ok(), before);
    }

    #[test]
    fn test_history_conversion_keeps_tool_pairing() {
        let llm = LLM::new(LLMConfig {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
        })
        .with_instructions("system");

        let call = ToolCallRequest::new("call_1", "get_current_date", json!({}));
        let history = vec![
            Message::user("What day is it?"),
            Message::assistant_with_tools("", vec![call.clone()]),
            Message::from(crate::events::ToolResult::success(&call, json!("2026-10-16"))),
        ];

        let messages = llm.to_chat_messages(&history);
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0].role, ChatRole::System));
        assert!(matches!(messages[2].role, ChatRole::Assistant));
        assert!(matches!(messages[3].role, ChatRole::Tool));
    }

    #[tokio::test]
    async fn test_scripted_model_replays_then_fails() {
        let model = ScriptedModel::new(vec![Message::assistant("hello")])
            .then_fail(ModelError::Request("rate limited".to_string()));

        let first = model.invoke(&[Message::user("hi")], &[]).await.unwrap();
        assert_eq!(first.content, "hello");
        assert!(model.invoke(&[], &[]).await.is_err());
        assert!(matches!(
            model.invoke(&[], &[]).await,
            Err(ModelError::Request(msg)) if msg == "script exhausted"
        ));
        assert_eq!(model.invocations().len(), 3);
    }
}
