//! `ferroact agent`: interactive or single-message chat.

use crate::commands::{status, usage};
use crate::runtime::Runtime;
use ferroact_agent::StreamCallbacks;
use ferroact_config::AppConfig;
use ferroact_core::agent::{AgentResponse, MessageContext, ResponseStatus};
use ferroact_core::message::ConversationId;
use ferroact_core::tool::{ToolCall, ToolResult};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(
    config: AppConfig,
    message: Option<String>,
    conversation: Option<String>,
    user: Option<String>,
    trace: bool,
) -> anyhow::Result<()> {
    let runtime = Runtime::build(config)?;
    let conversation_id = conversation
        .map(|id| ConversationId::from(id.as_str()))
        .unwrap_or_default();
    let context = user.map(MessageContext::for_user).unwrap_or_default();
    let callbacks = if trace { trace_callbacks() } else { StreamCallbacks::default() };

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let response = runtime
            .engine
            .process_message_with_streaming(&conversation_id, &msg, &context, &callbacks)
            .await;
        eprint!("\r              \r");
        println!("{}", response.content);
        print_footer(&response);
        return Ok(());
    }

    let tools: Vec<String> = runtime
        .engine
        .tools()
        .get_available_tools()
        .into_iter()
        .map(|t| t.name)
        .collect();

    println!();
    println!("  FerroAct Agent, interactive mode");
    println!();
    println!("  Providers:     {}", runtime.engine.providers().provider_ids().join(", "));
    println!("  Model:         {}", runtime.config.default_model);
    println!("  Tools:         {}", tools.join(", "));
    println!("  Conversation:  {conversation_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  /status and /usage show live state; 'exit' or Ctrl+D quits.");
    println!();

    let usage_key = context
        .user_id
        .clone()
        .unwrap_or_else(|| conversation_id.to_string());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "exit" | "quit" | "/exit" => break,
            "/status" => status::print_status(&runtime),
            "/usage" => usage::print_budget(runtime.engine.monitor(), &usage_key)?,
            _ => {
                eprint!("  ...");
                let response = runtime
                    .engine
                    .process_message_with_streaming(&conversation_id, input, &context, &callbacks)
                    .await;
                eprint!("\r     \r");
                println!();
                for line in response.content.lines() {
                    println!("  Assistant > {line}");
                }
                print_footer(&response);
                println!();
            }
        }
        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_footer(response: &AgentResponse) {
    match response.status {
        ResponseStatus::Complete => {}
        ResponseStatus::Partial => eprintln!(
            "  [partial] stopped after {} iterations without a final answer",
            response.iterations
        ),
        ResponseStatus::Failed => eprintln!(
            "  [degraded] {}",
            response.degraded_reason.as_deref().unwrap_or("unknown error")
        ),
    }
    tracing::debug!(
        iterations = response.iterations,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "Turn finished"
    );
}

fn trace_callbacks() -> StreamCallbacks {
    StreamCallbacks::new()
        .on_thinking(|thought: &str| eprintln!("  Thought: {thought}"))
        .on_action(|call: &ToolCall| {
            eprintln!(
                "  Action:  {} {}",
                call.name,
                serde_json::Value::Object(call.arguments.clone())
            )
        })
        .on_observation(|result: &ToolResult| {
            let marker = if result.success { "ok" } else { "failed" };
            eprintln!(
                "  Observe: [{marker}, {}ms] {}",
                result.duration_ms,
                result.output_text()
            )
        })
}
