//! `deskpilot agent`: Interactive or single-message chat mode.

use deskpilot_agent::{AgentError, InboundMessage};
use deskpilot_config::AppConfig;
use deskpilot_core::reply::AgentReply;
use deskpilot_gateway::runtime::{demo_toolset, Runtime};
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(message: Option<String>, user: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail early with a clear error when no API key is set
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    DESKPILOT_API_KEY  (generic)");
        eprintln!("    OPENAI_API_KEY     (provider \"openai\")");
        eprintln!("    GEMINI_API_KEY     (provider \"gemini\")");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider_name = config.default_provider.clone();
    let model = config.default_model.clone();
    let assistant = config.assistant.name.clone();
    let toolsets = demo_toolset(&config.tools);
    let runtime = Runtime::from_config(config, toolsets).await?;

    if let Some(text) = message {
        // Single message mode
        eprint!("  Thinking...");
        let result = runtime.dispatcher.dispatch(&InboundMessage::new(&user, text)).await;
        eprint!("\r              \r");
        print_outcome(result, "");
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  DeskPilot — Interactive Mode");
    println!();
    println!("  Provider:  {provider_name}");
    println!("  Model:     {model}");
    println!("  Assistant: {assistant}");
    println!("  User:      {user}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let result = runtime.dispatcher.dispatch(&InboundMessage::new(&user, text)).await;
        eprint!("\r     \r");
        println!();
        print_outcome(result, &format!("  {assistant} > "));
        println!();
    }

    println!();
    println!("  Até logo!");
    println!();
    Ok(())
}

fn print_outcome(result: Result<AgentReply, AgentError>, prefix: &str) {
    match result {
        Ok(reply) => {
            for line in render(&reply).lines() {
                println!("{prefix}{line}");
            }
        }
        Err(e) if e.is_auth_required() => eprintln!("  [Auth] {}", e.user_message()),
        Err(e) => {
            tracing::warn!(error = %e, "Agent run failed");
            eprintln!("  [Error] {}", e.user_message());
        }
    }
}

/// Plain-text rendering of a structured reply.
fn render(reply: &AgentReply) -> String {
    match reply {
        AgentReply::Text { text } => text.clone(),
        AgentReply::Choices { text, choices } => {
            let mut out = text.clone();
            for (i, choice) in choices.iter().enumerate() {
                out.push_str(&format!("\n  [{}] {}", i + 1, choice.title));
            }
            out
        }
        AgentReply::List { text, button_text, sections } => {
            let mut out = format!("{text}\n({button_text})");
            for section in sections {
                out.push_str(&format!("\n  {}", section.title));
                for row in &section.rows {
                    out.push_str(&format!("\n    • {}", row.title));
                    if !row.description.is_empty() {
                        out.push_str(&format!(" — {}", row.description));
                    }
                }
            }
            out
        }
    }
}
