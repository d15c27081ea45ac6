//! The Conversation Memory Store.
//!
//! One JSON-encoded turn list per user, stored under `conversation:{user_id}`
//! in any [`MemoryBackend`]. Reads and writes are all-or-nothing per user.
//! Backend failures are logged and read as an empty history.

use async_trait::async_trait;
use deskpilot_core::memory::{ConversationStore, MemoryBackend};
use deskpilot_core::message::{sanitize_transcript, ConversationTurn};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::compaction::{compact, CompactionPolicy};

const KEY_PREFIX: &str = "conversation:";

pub struct ConversationMemory {
    backend: Arc<dyn MemoryBackend>,
    policy: CompactionPolicy,
}

impl ConversationMemory {
    pub fn new(backend: Arc<dyn MemoryBackend>, policy: CompactionPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn policy(&self) -> &CompactionPolicy {
        &self.policy
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn key(user_id: &str) -> String {
        format!("{KEY_PREFIX}{user_id}")
    }

    /// Users with a stored conversation.
    pub async fn users(&self) -> Vec<String> {
        match self.backend.keys(KEY_PREFIX).await {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(str::to_string))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list conversations");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl ConversationStore for ConversationMemory {
    async fn get(&self, user_id: &str) -> Vec<ConversationTurn> {
        let raw = match self.backend.get(&Self::key(user_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(user_id, error = %e, "Failed to load conversation, starting fresh");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<ConversationTurn>>(&raw) {
            Ok(turns) => sanitize_transcript(turns),
            Err(e) => {
                warn!(user_id, error = %e, "Discarding unreadable conversation");
                Vec::new()
            }
        }
    }

    async fn save(&self, user_id: &str, turns: Vec<ConversationTurn>) {
        let before = turns.len();
        let turns = compact(turns, &self.policy);
        debug!(user_id, before, after = turns.len(), "Saving conversation");

        let raw = match serde_json::to_string(&turns) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to serialize conversation");
                return;
            }
        };
        if let Err(e) = self.backend.put(&Self::key(user_id), raw).await {
            warn!(user_id, error = %e, "Failed to save conversation");
        }
    }

    async fn clear(&self, user_id: &str) {
        if let Err(e) = self.backend.delete(&Self::key(user_id)).await {
            warn!(user_id, error = %e, "Failed to clear conversation");
        }
    }
}
