use crate::agent::AgentConfig;
use crate::llm::LLMConfig;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetrySinkKind {
    Log,
    None,
}

/// Process configuration, resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LLMConfig,
    pub agent: AgentConfig,
    pub telemetry_sink: TelemetrySinkKind,
    /// Directory for the file-backed store; `None` keeps threads in memory.
    pub store_dir: Option<PathBuf>,
    pub server_addr: String,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenv::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = get("MODEL_PROVIDER").unwrap_or_else(|| "openai".to_string());
        let api_key = get("MODEL_API_KEY").or_else(|| match provider.as_str() {
            "anthropic" => get("ANTHROPIC_API_KEY"),
            _ => get("OPENAI_API_KEY"),
        });
        let llm = LLMConfig {
            model: get("MODEL_NAME").unwrap_or_else(|| "gpt-4o".to_string()),
            provider,
            api_key,
        };

        let defaults = AgentConfig::default();
        let max_turns = match get("MAX_TURNS") {
            None => defaults.max_turns,
            Some(v) if v == "0" || v.eq_ignore_ascii_case("none") => None,
            Some(v) => Some(v.parse::<usize>().map_err(|_| ConfigError::Invalid {
                key: "MAX_TURNS",
                value: v.clone(),
            })?),
        };
        let parallel_tool_execution = match get("PARALLEL_TOOL_EXECUTION") {
            None => defaults.parallel_tool_execution,
            Some(v) => parse_bool("PARALLEL_TOOL_EXECUTION", &v)?,
        };
        let agent = AgentConfig {
            name: get("AGENT_NAME").unwrap_or_else(|| "Weekend Planner".to_string()),
            max_turns,
            parallel_tool_execution,
        };

        let telemetry_sink = match get("TELEMETRY_SINK").as_deref() {
            None | Some("log") => TelemetrySinkKind::Log,
            Some("none") => TelemetrySinkKind::None,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "TELEMETRY_SINK",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            llm,
            agent,
            telemetry_sink,
            store_dir: get("STORE_DIR").map(PathBuf::from),
            server_addr: get("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
        })
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.agent.max_turns, Some(10));
        assert!(!config.agent.parallel_tool_execution);
        assert_eq!(config.telemetry_sink, TelemetrySinkKind::Log);
        assert!(config.store_dir.is_none());
        assert_eq!(config.agent.name, "Weekend Planner");
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("MODEL_PROVIDER", "anthropic"),
            ("ANTHROPIC_API_KEY", "sk-ant"),
            ("MAX_TURNS", "none"),
            ("PARALLEL_TOOL_EXECUTION", "true"),
            ("AGENT_NAME", "Music Player Agent"),
            ("STORE_DIR", "/tmp/threads"),
        ])
        .unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-ant"));
        assert_eq!(config.agent.max_turns, None);
        assert!(config.agent.parallel_tool_execution);
        assert_eq!(config.agent.name, "Music Player Agent");
        assert_eq!(config.store_dir, Some(PathBuf::from("/tmp/threads")));
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            config_from(&[("MAX_TURNS", "many")]).unwrap_err(),
            ConfigError::Invalid {
                key: "MAX_TURNS",
                value: "many".to_string()
            }
        );
        assert!(config_from(&[("PARALLEL_TOOL_EXECUTION", "maybe")]).is_err());
        assert!(config_from(&[("TELEMETRY_SINK", "otlp")]).is_err());
    }
}
