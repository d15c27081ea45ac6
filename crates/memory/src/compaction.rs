//! The save-time pipeline that keeps a conversation bounded.
//!
//! Applied in order on every save:
//! 1. hard cap on turn count (oldest dropped first)
//! 2. compression of tool results outside the most recent turns
//! 3. token-budget pruning of the oldest turns
//! 4. removal of tool turns left at the head

use deskpilot_core::message::{drop_leading_tool_turns, estimate_turns_tokens, Arguments, ConversationTurn, Part};
use serde_json::Value;

/// Marker appended to clipped free text.
pub const ELISION_MARKER: &str = "…[truncado]";

/// Turns never pruned below this count, whatever their size.
const MIN_TURNS: usize = 2;

/// Fields that identify a record and survive compression.
const SUMMARY_KEYS: &[&str] = &["id", "status", "total", "mensagem"];

/// Candidate display-name fields, first match wins.
const NAME_KEYS: &[&str] = &["nome", "name", "titulo", "title", "nome_completo"];

#[derive(Debug, Clone)]
pub struct CompactionPolicy {
    pub max_turns: usize,
    pub keep_recent: usize,
    pub token_budget: usize,
    pub text_clip_chars: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            max_turns: 50,
            keep_recent: 4,
            token_budget: 3500,
            text_clip_chars: 100,
        }
    }
}

/// Run the whole pipeline.
pub fn compact(mut turns: Vec<ConversationTurn>, policy: &CompactionPolicy) -> Vec<ConversationTurn> {
    if turns.len() > policy.max_turns {
        let excess = turns.len() - policy.max_turns;
        turns.drain(..excess);
    }

    let compress_until = turns.len().saturating_sub(policy.keep_recent);
    for turn in turns.iter_mut().take(compress_until) {
        compress_turn(turn, policy.text_clip_chars);
    }

    while turns.len() > MIN_TURNS && estimate_turns_tokens(&turns) > policy.token_budget {
        turns.remove(0);
    }

    drop_leading_tool_turns(&mut turns);
    turns
}

fn compress_turn(turn: &mut ConversationTurn, clip: usize) {
    for part in turn.parts.iter_mut() {
        if let Part::ToolResult { name, result, .. } = part {
            *result = compress_result(name, result, clip);
        }
    }
}

/// Rewrite one tool result into its compact summary.
///
/// Running it twice yields the same value.
pub fn compress_result(tool_name: &str, result: &Arguments, clip: usize) -> Arguments {
    if result.get("status").and_then(Value::as_str) == Some("error") {
        let mut out = Arguments::new();
        out.insert("tool".into(), Value::String(tool_name.to_string()));
        out.insert("status".into(), Value::String("error".into()));
        out.insert("error".into(), result.get("error").cloned().unwrap_or(Value::Null));
        return out;
    }
    compress_object(result, clip)
}

fn compress_object(map: &Arguments, clip: usize) -> Arguments {
    let mut out = Arguments::new();
    for (key, value) in map {
        let compressed = match value {
            Value::Array(items) if is_record_list(items) => {
                Value::Array(items.iter().filter_map(Value::as_object).map(identity_of).collect())
            }
            Value::Object(inner) => Value::Object(compress_object(inner, clip)),
            Value::String(s) if SUMMARY_KEYS.contains(&key.as_str()) => Value::String(s.clone()),
            Value::String(s) => Value::String(clip_text(s, clip)),
            other => other.clone(),
        };
        out.insert(key.clone(), compressed);
    }
    out
}

fn is_record_list(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(Value::is_object)
}

/// `id`, the first name-like field, and `status` of one list item.
fn identity_of(item: &Arguments) -> Value {
    let mut out = Arguments::new();
    if let Some(id) = item.get("id") {
        out.insert("id".into(), id.clone());
    }
    if let Some((key, value)) = NAME_KEYS.iter().find_map(|k| item.get(*k).map(|v| (*k, v))) {
        out.insert(key.into(), value.clone());
    }
    if let Some(status) = item.get("status") {
        out.insert("status".into(), status.clone());
    }
    Value::Object(out)
}

/// Keep the first `max_chars` characters and append the elision marker.
pub fn clip_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push_str(ELISION_MARKER);
    clipped
}
