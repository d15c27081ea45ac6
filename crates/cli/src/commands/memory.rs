//! `deskpilot memory`: Inspect or clear a user's conversation.

use deskpilot_config::AppConfig;
use deskpilot_core::memory::ConversationStore;
use deskpilot_core::message::{estimate_turns_tokens, ConversationTurn, Part, Role};
use deskpilot_gateway::runtime::compaction_policy;
use deskpilot_memory::ConversationMemory;

async fn open(config: &AppConfig) -> Result<ConversationMemory, Box<dyn std::error::Error>> {
    let backend = deskpilot_memory::open_backend(&config.memory.backend, &config.memory_path()).await?;
    Ok(ConversationMemory::new(backend, compaction_policy(&config.memory)))
}

pub async fn show(user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let memory = open(&config).await?;
    let turns = memory.get(user).await;

    println!("Conversation for {user}");
    println!("   Backend: {} ({})", memory.backend_name(), config.memory_path().display());
    println!("   Turns:   {}", turns.len());
    println!("   Tokens:  ~{}", estimate_turns_tokens(&turns));
    println!();

    if turns.is_empty() {
        println!("   (empty)");
    }
    for (i, turn) in turns.iter().enumerate() {
        println!("  {i:>3}. {}", describe(turn));
    }
    Ok(())
}

pub async fn clear(user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let memory = open(&config).await?;
    memory.clear(user).await;
    println!("Cleared conversation for {user}");
    Ok(())
}

/// One summary line per turn.
fn describe(turn: &ConversationTurn) -> String {
    let role = match turn.role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let parts: Vec<String> = turn
        .parts
        .iter()
        .map(|part| match part {
            Part::Text { text } => preview(text, 80),
            Part::ToolInvocation { name, arguments, .. } => {
                format!("→ {name}({})", preview(&serde_json::Value::Object(arguments.clone()).to_string(), 60))
            }
            Part::ToolResult { name, result, .. } => {
                format!("← {name}: {}", preview(&serde_json::Value::Object(result.clone()).to_string(), 60))
            }
        })
        .collect();
    format!("[{role}] {}", parts.join(" | "))
}

fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max).collect();
        format!("{cut}…")
    }
}
