use agentrace_sdk_rs::{
    agent::tools::{GetActivitiesTool, GetCurrentDateTool, GetWeatherTool},
    agent::Agent,
    config::AppConfig,
    llm::LLM,
    prompts::WEEKEND_PLANNER_INSTRUCTIONS,
    runtime::LocalRuntime,
    session::SessionRunner,
    store::InMemoryMessageStore,
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

    println!("Initializing {}...", config.agent.name);

    let llm = LLM::new(config.llm.clone()).with_instructions(WEEKEND_PLANNER_INSTRUCTIONS);
    let runtime = LocalRuntime::default()
        .with_tool(GetWeatherTool::new())
        .with_tool(GetActivitiesTool)
        .with_tool(GetCurrentDateTool);

    let agent = Agent::new(Arc::new(llm), Arc::new(runtime), config.agent.clone());
    let recorder = SpanRecorder::configure(LogSpanSink);
    let runner = SessionRunner::new(agent, Arc::new(InMemoryMessageStore::new()), recorder.clone());

    let request = "Hi, what can I do this weekend in Seattle?";
    println!("\nUser: {}", request);

    let outcome = runner.run(&uuid::Uuid::new_v4().to_string(), request).await;
    recorder.shutdown();

    let outcome = outcome?;
    println!(
        "\nAgent ({} tool rounds):\n{}",
        outcome.action_rounds, outcome.final_answer
    );
    Ok(())
}
