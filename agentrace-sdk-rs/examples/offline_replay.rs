//! Runs the weekend planner against a scripted model and prints the recorded span tree.
//! No network access or API key needed.

use agentrace_sdk_rs::{
    agent::tools::{GetActivitiesTool, GetCurrentDateTool, GetWeatherTool},
    agent::{Agent, AgentConfig},
    events::{Message, ToolCallRequest},
    llm::ScriptedModel,
    runtime::LocalRuntime,
    session::SessionRunner,
    store::InMemoryMessageStore,
    telemetry::{InMemorySpanSink, SpanRecord, SpanRecorder},
};
use serde_json::json;
use std::sync::Arc;

fn print_tree(sink: &InMemorySpanSink, span: &SpanRecord, depth: usize) {
    println!(
        "{}{} [{:?}, {} ms]",
        "  ".repeat(depth),
        span.name,
        span.status,
        span.duration_ms()
    );
    for (key, value) in &span.attributes {
        println!("{}  - {} = {:?}", "  ".repeat(depth), key, value);
    }
    for child in sink.children_of(span.span_id) {
        print_tree(sink, &child, depth + 1);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agentrace_sdk_rs::logger::init_logging();

    let model = ScriptedModel::new(vec![
        Message::assistant_with_tools(
            "",
            vec![ToolCallRequest::new("call_1", "get_current_date", json!({}))],
        ),
        Message::assistant_with_tools(
            "",
            vec![ToolCallRequest::new("call_2", "get_weather", json!({"city": "Seattle"}))],
        ),
        Message::assistant_with_tools(
            "",
            vec![ToolCallRequest::new(
                "call_3",
                "get_activities",
                json!({"city": "Seattle", "date": "2026-10-17"}),
            )],
        ),
        Message::assistant(
            "This weekend (2026-10-17) looks rainy in Seattle, so skip the beach and hiking. The museum is a great choice.",
        ),
    ])
    .with_identity("openai", "gpt-4o");

    let runtime = LocalRuntime::default()
        .with_tool(GetWeatherTool::with_sunny_probability(0.0))
        .with_tool(GetActivitiesTool)
        .with_tool(GetCurrentDateTool);

    let agent = Agent::new(
        Arc::new(model),
        Arc::new(runtime),
        AgentConfig {
            name: "Weekend Planner".to_string(),
            ..AgentConfig::default()
        },
    );

    let sink = InMemorySpanSink::new();
    let recorder = SpanRecorder::configure(sink.clone());
    let runner = SessionRunner::new(agent, Arc::new(InMemoryMessageStore::new()), recorder.clone());

    let outcome = runner
        .run("offline-1", "Hi, what can I do this weekend in Seattle?")
        .await?;
    recorder.shutdown();

    println!("\nFinal answer: {}\n", outcome.final_answer);
    for root in sink.roots() {
        print_tree(&sink, &root, 0);
    }
    Ok(())
}
