//! Per-user fixed-window rate limiting.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use crate::session::MIN_SWEEP_INTERVAL;

#[derive(Debug, Clone, Copy)]
struct RateBucket {
    count: u32,
    window_start: Instant,
}

/// Admits at most `max_messages` per user per window.
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, RateBucket>>,
    max_messages: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_messages: u32, window: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_messages,
            window,
        }
    }

    /// Count this message against the user's window. `false` means throttled.
    pub fn allow(&self, user_id: &str) -> bool {
        self.allow_at(user_id, Instant::now())
    }

    fn allow_at(&self, user_id: &str, now: Instant) -> bool {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let bucket = buckets.entry(user_id.to_string()).or_insert(RateBucket {
            count: 0,
            window_start: now,
        });
        if now.duration_since(bucket.window_start) > self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }
        bucket.count += 1;
        bucket.count <= self.max_messages
    }

    /// Drop buckets whose window has long expired. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = buckets.len();
        buckets.retain(|_, b| now.duration_since(b.window_start) <= self.window);
        before - buckets.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.buckets.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Sweep every `interval` until the returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.sweep();
                if removed > 0 {
                    debug!(removed, "Swept idle rate-limit buckets");
                }
            }
        })
    }
}
