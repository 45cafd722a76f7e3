//! Fixed-window rate limiting per client and endpoint
//!
//! Each `(client, endpoint)` pair gets a counter and a reset deadline. The
//! first attempt opens a window; attempts past `max_attempts` inside that
//! window are rejected. When the deadline passes the next attempt opens a
//! fresh window with a count of one.
//!
//! This is a fixed window, not a sliding one: a client can make
//! `max_attempts` requests just before a window closes and another
//! `max_attempts` just after it reopens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RateLimitConfig;

/// Returned when a client has used up its attempts for the current window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded for {endpoint}, retry in {retry_after:?}")]
pub struct RateLimitExceeded {
    pub endpoint: String,
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    reset_at: Instant,
}

/// Thread-safe fixed-window limiter keyed by `client + ":" + endpoint`.
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_attempts, config.window())
    }

    /// Count one attempt by `client` against `endpoint`.
    ///
    /// The attempt that pushes the count past `max_attempts` is itself
    /// rejected. Endpoints are independent: exhausting one leaves the
    /// client's budget for every other endpoint untouched.
    pub async fn check(&self, client: &str, endpoint: &str) -> Result<(), RateLimitExceeded> {
        let key = format!("{client}:{endpoint}");
        let now = Instant::now();

        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key).or_insert(Entry {
            count: 0,
            reset_at: now + self.window,
        });

        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.window;
        }

        entry.count = entry.count.saturating_add(1);
        if entry.count > self.max_attempts {
            return Err(RateLimitExceeded {
                endpoint: endpoint.to_string(),
                retry_after: entry.reset_at.saturating_duration_since(now),
            });
        }

        Ok(())
    }

    /// Drop every entry whose window has elapsed.
    ///
    /// `check` already treats expired entries as absent, so this only
    /// bounds memory.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| now < entry.reset_at);
        before - entries.len()
    }

    /// Number of tracked keys, expired or not.
    pub async fn size(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Current count for a key, if it is being tracked.
    #[cfg(test)]
    async fn count(&self, client: &str, endpoint: &str) -> Option<u32> {
        let entries = self.entries.lock().await;
        entries.get(&format!("{client}:{endpoint}")).map(|e| e.count)
    }
}

/// Spawn the periodic sweep that evicts expired windows.
///
/// The caller owns the returned handle and aborts it on teardown.
pub fn spawn_cleanup_task(
    limiter: Arc<RateLimiter>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Nothing to sweep at startup
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = limiter.cleanup().await;
            if removed > 0 {
                debug!(removed, "evicted expired rate limit windows");
            }
        }
    })
}
