//! Conversation turn domain types.
//!
//! A transcript is an ordered list of [`ConversationTurn`]s. Each turn carries
//! one or more [`Part`]s: free text, tool invocations requested by the model,
//! or the results of those invocations.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tool arguments and results are always JSON objects.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution results
    Tool,
}

/// One element of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text {
        text: String,
    },
    ToolInvocation {
        id: String,
        name: String,
        arguments: Arguments,
    },
    ToolResult {
        call_id: String,
        name: String,
        result: Arguments,
    },
}

impl Part {
    /// Approximate character footprint used by the token heuristic.
    fn char_len(&self) -> usize {
        match self {
            Part::Text { text } => text.chars().count(),
            Part::ToolInvocation { name, arguments, .. } => name.chars().count() + json_chars(arguments),
            Part::ToolResult { name, result, .. } => name.chars().count() + json_chars(result),
        }
    }
}

fn json_chars(map: &Arguments) -> usize {
    serde_json::to_string(map).map(|s| s.chars().count()).unwrap_or(0)
}

/// A single logical step in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn assistant(parts: Vec<Part>) -> Self {
        Self { role: Role::Assistant, parts }
    }

    pub fn tool(parts: Vec<Part>) -> Self {
        Self { role: Role::Tool, parts }
    }

    pub fn is_tool(&self) -> bool {
        self.role == Role::Tool
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// IDs of the tool invocations carried by this turn.
    pub fn invocation_ids(&self) -> HashSet<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolInvocation { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Call IDs referenced by the tool results in this turn.
    pub fn result_call_ids(&self) -> HashSet<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::ToolResult { call_id, .. } => Some(call_id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_invocations(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolInvocation { .. }))
    }

    fn char_len(&self) -> usize {
        self.parts.iter().map(Part::char_len).sum()
    }
}

/// Approximate token count for a run of characters: chars / 3.5 plus a 10% margin.
pub fn estimate_tokens_for_chars(chars: usize) -> usize {
    ((chars as f64 / 3.5) * 1.1).ceil() as usize
}

/// Approximate token count for a slice of turns.
pub fn estimate_turns_tokens(turns: &[ConversationTurn]) -> usize {
    estimate_tokens_for_chars(turns.iter().map(ConversationTurn::char_len).sum())
}

/// Drop `Tool` turns from the head until the first turn is not a tool result.
///
/// Returns how many turns were removed.
pub fn drop_leading_tool_turns(turns: &mut Vec<ConversationTurn>) -> usize {
    let leading = turns.iter().take_while(|t| t.is_tool()).count();
    turns.drain(..leading);
    leading
}

/// Restore referential integrity of a stored transcript.
///
/// A tool result survives only when the assistant turn immediately before it
/// carries an invocation with the same id. An invocation survives only when
/// the following tool turn answers it. Turns left without parts are dropped.
pub fn sanitize_transcript(turns: Vec<ConversationTurn>) -> Vec<ConversationTurn> {
    let mut linked: Vec<ConversationTurn> = Vec::with_capacity(turns.len());
    for mut turn in turns {
        if turn.is_tool() {
            let known: HashSet<String> = match linked.last() {
                Some(prev) if prev.role == Role::Assistant => {
                    prev.invocation_ids().into_iter().map(str::to_string).collect()
                }
                _ => HashSet::new(),
            };
            turn.parts.retain(|p| match p {
                Part::ToolResult { call_id, .. } => known.contains(call_id),
                _ => false,
            });
            if turn.parts.is_empty() {
                continue;
            }
        }
        linked.push(turn);
    }

    let mut out = Vec::with_capacity(linked.len());
    let mut iter = linked.into_iter().peekable();
    while let Some(mut turn) = iter.next() {
        if turn.role == Role::Assistant && turn.has_invocations() {
            let answered: HashSet<String> = match iter.peek() {
                Some(next) if next.is_tool() => next.result_call_ids().into_iter().map(str::to_string).collect(),
                _ => HashSet::new(),
            };
            turn.parts.retain(|p| match p {
                Part::ToolInvocation { id, .. } => answered.contains(id),
                _ => true,
            });
            if turn.parts.is_empty() {
                continue;
            }
        }
        out.push(turn);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(id: &str, name: &str) -> Part {
        Part::ToolInvocation {
            id: id.into(),
            name: name.into(),
            arguments: Arguments::new(),
        }
    }

    fn result(call_id: &str, name: &str) -> Part {
        let mut result = Arguments::new();
        result.insert("status".into(), "ok".into());
        Part::ToolResult {
            call_id: call_id.into(),
            name: name.into(),
            result,
        }
    }

    #[test]
    fn user_turn_text() {
        let turn = ConversationTurn::user("meus chamados");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.text(), "meus chamados");
        assert!(!turn.has_invocations());
    }

    #[test]
    fn turn_serialization_is_tagged() {
        let turn = ConversationTurn::assistant(vec![invocation("c1", "get_ticket")]);
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["parts"][0]["type"], "tool_invocation");
        let back: ConversationTurn = serde_json::from_value(json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn token_estimate_uses_margin() {
        // 35 chars / 3.5 = 10, * 1.1 = 11
        assert_eq!(estimate_tokens_for_chars(35), 11);
        assert_eq!(estimate_tokens_for_chars(0), 0);
        let turns = vec![ConversationTurn::user("a".repeat(35))];
        assert_eq!(estimate_turns_tokens(&turns), 11);
    }

    #[test]
    fn token_estimate_counts_chars_not_bytes() {
        let ascii = vec![ConversationTurn::user("aaaaaaa")];
        let accented = vec![ConversationTurn::user("ééééééé")];
        assert_eq!(estimate_turns_tokens(&ascii), estimate_turns_tokens(&accented));
    }

    #[test]
    fn leading_tool_turns_removed() {
        let mut turns = vec![
            ConversationTurn::tool(vec![result("c1", "x")]),
            ConversationTurn::tool(vec![result("c2", "x")]),
            ConversationTurn::user("oi"),
        ];
        assert_eq!(drop_leading_tool_turns(&mut turns), 2);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);
    }

    #[test]
    fn sanitize_keeps_valid_exchange() {
        let turns = vec![
            ConversationTurn::user("oi"),
            ConversationTurn::assistant(vec![invocation("c1", "list_my_tickets")]),
            ConversationTurn::tool(vec![result("c1", "list_my_tickets")]),
            ConversationTurn::assistant_text("Você tem 3 chamados."),
        ];
        let cleaned = sanitize_transcript(turns.clone());
        assert_eq!(cleaned, turns);
    }

    #[test]
    fn sanitize_drops_orphan_tool_turn() {
        let turns = vec![
            ConversationTurn::tool(vec![result("c1", "x")]),
            ConversationTurn::user("oi"),
            ConversationTurn::tool(vec![result("c9", "x")]),
        ];
        let cleaned = sanitize_transcript(turns);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].role, Role::User);
    }

    #[test]
    fn sanitize_strips_unanswered_invocations() {
        let turns = vec![
            ConversationTurn::user("oi"),
            ConversationTurn::assistant(vec![
                Part::Text { text: "vou verificar".into() },
                invocation("c1", "a"),
                invocation("c2", "b"),
            ]),
            ConversationTurn::tool(vec![result("c1", "a"), result("c7", "z")]),
            ConversationTurn::assistant(vec![invocation("c3", "c")]),
        ];
        let cleaned = sanitize_transcript(turns);
        assert_eq!(cleaned.len(), 3);
        assert_eq!(cleaned[1].invocation_ids(), HashSet::from(["c1"]));
        assert_eq!(cleaned[2].result_call_ids(), HashSet::from(["c1"]));
    }
}
