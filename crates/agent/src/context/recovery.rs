//! Shrinking the transcript after the model rejects it.

use deskpilot_core::error::ProviderError;
use deskpilot_core::message::{drop_leading_tool_turns, ConversationTurn};

/// Why turns are being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    /// Proactive: the estimate exceeded the request budget
    Budget,
    /// The backend reported the input is too long
    Overflow,
    /// A generic 400, often a broken invocation/result pairing
    BadRequest,
}

impl PruneReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Overflow => "overflow",
            Self::BadRequest => "bad_request",
        }
    }

    /// The recovery flavor for a provider error, if shrinking can help.
    pub fn for_error(error: &ProviderError) -> Option<Self> {
        if error.is_context_overflow() {
            Some(Self::Overflow)
        } else if error.is_bad_request() {
            Some(Self::BadRequest)
        } else {
            None
        }
    }

    /// Turns to drop on recovery attempt `attempt` (1-based).
    pub fn drop_count(&self, attempt: usize) -> usize {
        match self {
            Self::Overflow => 2 * attempt,
            Self::BadRequest | Self::Budget => attempt,
        }
    }
}

/// Drop up to `count` of the oldest turns, never touching index
/// `protected_from` or later, then drop tool turns left orphaned at the head.
///
/// Returns the total number of turns removed.
pub fn prune_oldest(turns: &mut Vec<ConversationTurn>, count: usize, protected_from: usize) -> usize {
    let take = count.min(protected_from).min(turns.len());
    turns.drain(..take);
    let repaired = if protected_from > take {
        let head = protected_from - take;
        let mut prefix: Vec<ConversationTurn> = turns.drain(..head).collect();
        let dropped = drop_leading_tool_turns(&mut prefix);
        turns.splice(0..0, prefix);
        dropped
    } else {
        0
    };
    take + repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_core::message::{Arguments, Part};

    fn exchange(n: usize) -> Vec<ConversationTurn> {
        vec![
            ConversationTurn::user(format!("pergunta {n}")),
            ConversationTurn::assistant(vec![Part::ToolInvocation {
                id: format!("c{n}"),
                name: "list_my_tickets".into(),
                arguments: Arguments::new(),
            }]),
            ConversationTurn::tool(vec![Part::ToolResult {
                call_id: format!("c{n}"),
                name: "list_my_tickets".into(),
                result: Arguments::new(),
            }]),
            ConversationTurn::assistant_text(format!("resposta {n}")),
        ]
    }

    #[test]
    fn drop_counts() {
        assert_eq!(PruneReason::Overflow.drop_count(1), 2);
        assert_eq!(PruneReason::Overflow.drop_count(3), 6);
        assert_eq!(PruneReason::BadRequest.drop_count(2), 2);
    }

    #[test]
    fn reason_from_error() {
        let overflow = ProviderError::ApiError { status_code: 400, message: "context_length_exceeded".into() };
        let bad = ProviderError::ApiError { status_code: 400, message: "bad tool_call_id".into() };
        let other = ProviderError::ApiError { status_code: 500, message: "boom".into() };
        assert_eq!(PruneReason::for_error(&overflow), Some(PruneReason::Overflow));
        assert_eq!(PruneReason::for_error(&bad), Some(PruneReason::BadRequest));
        assert_eq!(PruneReason::for_error(&other), None);
    }

    #[test]
    fn pruning_repairs_orphaned_tool_turn() {
        let mut turns = exchange(1);
        turns.push(ConversationTurn::user("agora"));
        // Dropping 2 leaves the tool result first; it goes too.
        let dropped = prune_oldest(&mut turns, 2, 4);
        assert_eq!(dropped, 3);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text(), "resposta 1");
    }

    #[test]
    fn protected_tail_survives() {
        let mut turns = exchange(1);
        turns.push(ConversationTurn::user("agora"));
        let dropped = prune_oldest(&mut turns, 100, 4);
        assert_eq!(dropped, 4);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text(), "agora");
    }

    #[test]
    fn nothing_droppable() {
        let mut turns = vec![ConversationTurn::user("oi")];
        assert_eq!(prune_oldest(&mut turns, 3, 0), 0);
        assert_eq!(turns.len(), 1);
    }
}
