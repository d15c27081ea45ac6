//! Memory traits: durable storage for per-user conversations.
//!
//! Two layers:
//! - [`MemoryBackend`] is an opaque durable string map (in-memory, file, SQLite).
//! - [`ConversationStore`] is the bounded, self-repairing conversation memory
//!   the orchestrator reads before and writes after every run.

use async_trait::async_trait;
use crate::error::MemoryError;
use crate::message::ConversationTurn;

/// A raw key-value persistence engine.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Backend name (e.g., "in_memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// Fetch a value. Absence is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, MemoryError>;

    /// Insert or replace a value.
    async fn put(&self, key: &str, value: String) -> std::result::Result<(), MemoryError>;

    /// Remove a value. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> std::result::Result<(), MemoryError>;

    /// All keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> std::result::Result<Vec<String>, MemoryError>;
}

/// Per-user conversation memory.
///
/// None of these operations fail: storage problems are logged by the
/// implementation and read as an empty history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The user's ordered turns, or an empty list.
    async fn get(&self, user_id: &str) -> Vec<ConversationTurn>;

    /// Persist the user's turns, applying the store's bounding rules.
    async fn save(&self, user_id: &str, turns: Vec<ConversationTurn>);

    /// Forget the user's conversation.
    async fn clear(&self, user_id: &str);
}
