mod music;
mod weekend;

pub use music::{PlaySongOnAppleTool, PlaySongOnSpotifyTool};
pub use weekend::{GetActivitiesTool, GetCurrentDateTool, GetWeatherTool};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declaration of a tool as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON Schema
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> String;
    fn description(&self) -> String;
    fn parameters(&self) -> Value; // JSON Schema
    async fn call(&self, args: Value) -> Result<Value, String>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name(),
            description: self.description(),
            parameters: self.parameters(),
        }
    }
}

type ToolFn = dyn Fn(Value) -> Result<Value, String> + Send + Sync;

/// A tool backed by a plain function of its arguments.
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    func: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
            func: Box::new(func),
        }
    }

    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn call(&self, args: Value) -> Result<Value, String> {
        (self.func)(args)
    }
}

/// Reads a required string argument.
pub(crate) fn string_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing '{}' argument", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_tool_calls_closure() {
        let tool = FnTool::new("echo", "Echo the message back", |args| {
            Ok(json!({ "echo": string_arg(&args, "message")? }))
        });

        assert_eq!(tool.spec().name, "echo");
        let result = tool.call(json!({"message": "hi"})).await.unwrap();
        assert_eq!(result, json!({"echo": "hi"}));

        let err = tool.call(json!({})).await.unwrap_err();
        assert_eq!(err, "Missing 'message' argument");
    }
}
