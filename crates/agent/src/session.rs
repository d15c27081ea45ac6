//! Per-user session serialization.
//!
//! At most one agent run per user is in flight. Different users never
//! contend. Idle locks are reclaimed by a periodic sweep, never while held
//! or while another task is waiting on them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Shortest period a sweeper will tick at.
pub(crate) const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

struct SessionLock {
    lock: Arc<tokio::sync::Mutex<()>>,
    last_used: Instant,
}

#[derive(Default)]
pub struct SessionLockTable {
    locks: Mutex<HashMap<String, SessionLock>>,
}

impl SessionLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let entry = locks.entry(user_id.to_string()).or_insert_with(|| SessionLock {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            last_used: Instant::now(),
        });
        entry.last_used = Instant::now();
        Arc::clone(&entry.lock)
    }

    /// Run `f` while holding the user's lock. Same-user calls enter in
    /// acquisition order (tokio's mutex is fair).
    pub async fn with_lock<F, Fut, T>(&self, user_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(user_id);
        let _guard = lock.lock().await;
        let out = f().await;
        self.touch(user_id);
        out
    }

    fn touch(&self, user_id: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            if let Some(entry) = locks.get_mut(user_id) {
                entry.last_used = Instant::now();
            }
        }
    }

    /// Remove locks idle longer than `ttl`. A lock still referenced outside
    /// the table (held, or awaited) is kept regardless of age.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = locks.len();
        locks.retain(|_, entry| {
            let idle = now.duration_since(entry.last_used) > ttl;
            let unreferenced = Arc::strong_count(&entry.lock) == 1;
            !(idle && unreferenced && entry.lock.try_lock().is_ok())
        });
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep every `interval` until the returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, ttl: Duration) -> tokio::task::JoinHandle<()> {
        let table = Arc::clone(self);
        // tokio rejects a zero period
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = table.sweep(ttl);
                if removed > 0 {
                    debug!(removed, remaining = table.len(), "Swept idle session locks");
                }
            }
        })
    }
}
