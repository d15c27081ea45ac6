//! Conversation memory for DeskPilot.
//!
//! Raw persistence engines implement [`MemoryBackend`]; [`ConversationMemory`]
//! layers the bounded conversation store on top of any of them.

pub mod compaction;
pub mod file_backend;
pub mod history;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use compaction::{compact, CompactionPolicy};
pub use file_backend::FileBackend;
pub use history::ConversationMemory;
pub use in_memory::InMemoryBackend;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

use deskpilot_core::error::MemoryError;
use deskpilot_core::memory::MemoryBackend;
use std::path::Path;
use std::sync::Arc;

/// Open a backend by name ("in_memory", "file", "sqlite").
pub async fn open_backend(kind: &str, path: &Path) -> Result<Arc<dyn MemoryBackend>, MemoryError> {
    match kind {
        "in_memory" => Ok(Arc::new(InMemoryBackend::new())),
        "file" => Ok(Arc::new(FileBackend::new(path.to_path_buf()))),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MemoryError::Storage(format!("Failed to create memory directory: {e}"))
                })?;
            }
            let url = format!("sqlite://{}", path.display());
            Ok(Arc::new(SqliteBackend::new(&url).await?))
        }
        other => Err(MemoryError::Storage(format!("Unsupported memory backend: {other}"))),
    }
}
