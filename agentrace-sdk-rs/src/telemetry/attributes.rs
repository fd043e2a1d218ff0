//! Fixed attribute names per span kind.

pub const OPERATION_NAME: &str = "gen_ai.operation.name";
pub const PROVIDER_NAME: &str = "gen_ai.provider.name";
pub const REQUEST_MODEL: &str = "gen_ai.request.model";
pub const ERROR_TYPE: &str = "error.type";

// Session (root) spans.
pub const AGENT_NAME: &str = "agent.name";
pub const THREAD_ID: &str = "thread.id";
pub const USER_REQUEST: &str = "user.request";
pub const REQUEST_SUCCESS: &str = "request.success";
pub const AGENT_RESPONSE: &str = "agent.response";
pub const AGENT_ACTION_ROUNDS: &str = "agent.action_rounds";

// Model-invoke spans.
pub const RESPONSE_TOOL_CALLS: &str = "gen_ai.response.tool_calls";
pub const RESPONSE_FINISH: &str = "gen_ai.response.finish";

// Tool-execute spans.
pub const TOOL_NAME: &str = "gen_ai.tool.name";
pub const TOOL_CALL_ID: &str = "gen_ai.tool.call.id";
pub const TOOL_CALL_ARGUMENTS: &str = "gen_ai.tool.call.arguments";
pub const TOOL_CALL_RESULT: &str = "gen_ai.tool.call.result";
pub const TOOL_SUCCESS: &str = "tool.success";

pub const OP_INVOKE_AGENT: &str = "invoke_agent";
pub const OP_CHAT: &str = "chat";
pub const OP_EXECUTE_TOOL: &str = "execute_tool";

pub const MAX_ATTRIBUTE_CHARS: usize = 500;

pub fn session_span_name(agent_name: &str) -> String {
    format!("{} {}", OP_INVOKE_AGENT, agent_name)
}

pub fn model_span_name(model: &str) -> String {
    format!("{} {}", OP_CHAT, model)
}

pub fn tool_span_name(tool: &str) -> String {
    format!("{} {}", OP_EXECUTE_TOOL, tool)
}

/// First `MAX_ATTRIBUTE_CHARS` characters of `text`.
pub fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_ATTRIBUTE_CHARS) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "é".repeat(MAX_ATTRIBUTE_CHARS + 20);
        let truncated = truncate(&text);
        assert_eq!(truncated.chars().count(), MAX_ATTRIBUTE_CHARS);
        assert_eq!(truncate("short"), "short");
    }
}
