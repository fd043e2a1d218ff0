use agentrace_sdk_rs::{
    agent::tools::{PlaySongOnAppleTool, PlaySongOnSpotifyTool},
    agent::{Agent, AgentConfig},
    config::AppConfig,
    llm::LLM,
    prompts::MUSIC_PLAYER_INSTRUCTIONS,
    runtime::LocalRuntime,
    session::SessionRunner,
    store::{InMemoryMessageStore, MessageStore},
    telemetry::{LogSpanSink, SpanRecorder},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    agentrace_sdk_rs::logger::init_logging();

    let config = AppConfig::from_env()?;
    if config.llm.api_key.is_none() {
        println!("MODEL_API_KEY (or OPENAI_API_KEY) not set. Please set it to run this example.");
        return Ok(());
    }

    let llm = LLM::new(config.llm.clone()).with_instructions(MUSIC_PLAYER_INSTRUCTIONS);
    let runtime = LocalRuntime::default()
        .with_tool(PlaySongOnSpotifyTool)
        .with_tool(PlaySongOnAppleTool);

    // One tool call at a time, like a single-lane router.
    let agent_config = AgentConfig {
        name: "Music Player Agent".to_string(),
        parallel_tool_execution: false,
        ..config.agent.clone()
    };
    let agent = Agent::new(Arc::new(llm), Arc::new(runtime), agent_config);

    let store = Arc::new(InMemoryMessageStore::new());
    let recorder = SpanRecorder::configure(LogSpanSink);
    let runner = SessionRunner::new(agent, store.clone(), recorder.clone());

    let thread_id = "1";
    let result = runner
        .run(thread_id, "Can you play Taylor Swift's most popular song?")
        .await;
    recorder.shutdown();
    result?;

    for message in store.load(thread_id).await?.messages {
        println!("================ {:?} ================", message.role);
        if !message.content.is_empty() {
            println!("{}", message.content);
        }
        for call in &message.tool_calls {
            println!("Tool call: {} ({}) {}", call.tool_name, call.call_id, call.arguments);
        }
    }
    Ok(())
}
