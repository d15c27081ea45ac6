//! Domain event system: run telemetry without tight coupling.
//!
//! The orchestrator publishes an event whenever a heuristic threshold fires
//! (doom loop, pruning, throttling) so operators can observe and tune them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A user message was rejected by the rate limiter
    RateLimited {
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A tool was executed through the wrapper
    ToolExecuted {
        user_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The doom-loop guard aborted a run
    DoomLoopDetected {
        user_id: String,
        tool_name: String,
        /// "exact" or "name"
        rule: String,
        count: usize,
        threshold: usize,
        timestamp: DateTime<Utc>,
    },

    /// Turns were dropped to fit the model's context
    ContextPruned {
        user_id: String,
        /// "budget", "overflow" or "bad_request"
        reason: String,
        dropped: usize,
        remaining: usize,
        attempt: usize,
        timestamp: DateTime<Utc>,
    },

    /// All pruning attempts failed and the user's memory was wiped
    ConversationReset {
        user_id: String,
        timestamp: DateTime<Utc>,
    },

    /// The agent produced a final reply
    ResponseGenerated {
        user_id: String,
        model: String,
        iterations: usize,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::DoomLoopDetected {
            user_id: "5511999".into(),
            tool_name: "get_ticket".into(),
            rule: "exact".into(),
            count: 3,
            threshold: 2,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::DoomLoopDetected { tool_name, count, .. } => {
                assert_eq!(tool_name, "get_ticket");
                assert_eq!(*count, 3);
            }
            _ => panic!("Expected DoomLoopDetected event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::RateLimited {
            user_id: "u".into(),
            timestamp: Utc::now(),
        });
    }
}
