//! File-based backend: the whole map as one JSON object on disk.
//!
//! Entries are loaded on creation and flushed after every mutation, which is
//! plenty for a single-process deployment with modest traffic. The file is
//! written to a temporary sibling and renamed into place.

use async_trait::async_trait;
use deskpilot_core::error::MemoryError;
use deskpilot_core::memory::MemoryBackend;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub struct FileBackend {
    path: PathBuf,
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl FileBackend {
    /// Open (or lazily create) the store at `path`.
    ///
    /// An unreadable or corrupt file starts the store empty.
    pub fn new(path: PathBuf) -> Self {
        let entries = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = entries.len(), "File memory backend loaded");
        Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> BTreeMap<String, String> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return BTreeMap::new(),
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt memory file");
                BTreeMap::new()
            }
        }
    }

    async fn flush(&self) -> Result<(), MemoryError> {
        let entries = self.entries.read().await;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(&*entries)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| MemoryError::Storage(format!("Failed to replace memory file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl MemoryBackend for FileBackend {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, MemoryError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), MemoryError> {
        self.entries.write().await.insert(key.to_string(), value);
        self.flush().await
    }

    async fn delete(&self, key: &str) -> Result<(), MemoryError> {
        let removed = self.entries.write().await.remove(key).is_some();
        if removed {
            self.flush().await?;
        }
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, MemoryError> {
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.json");

        let backend = FileBackend::new(path.clone());
        backend.put("conversation:42", "[1]".into()).await.unwrap();
        assert!(path.exists());

        let reopened = FileBackend::new(path);
        assert_eq!(reopened.get("conversation:42").await.unwrap().as_deref(), Some("[1]"));
    }

    #[tokio::test]
    async fn delete_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");

        let backend = FileBackend::new(path.clone());
        backend.put("a", "1".into()).await.unwrap();
        backend.delete("a").await.unwrap();

        let reopened = FileBackend::new(path);
        assert!(reopened.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        std::fs::write(&path, "{not json").unwrap();

        let backend = FileBackend::new(path);
        assert!(backend.keys("").await.unwrap().is_empty());
    }
}
