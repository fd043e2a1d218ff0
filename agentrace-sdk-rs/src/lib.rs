pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod logger;
pub mod prompts;
pub mod runtime;
pub mod session;
pub mod store;
pub mod telemetry;
