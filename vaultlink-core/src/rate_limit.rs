//! Fixed-window rate limiter keyed by client identifier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Default ceiling per window
pub const DEFAULT_MAX_REQUESTS: u32 = 200;

/// Default window length (15 minutes)
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Per-identifier counter for the current window
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_time: Instant,
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Time until the window resets; zero when allowed
    pub wait_time: Duration,
}

/// Shared fixed-window counter. Clones share the same records.
#[derive(Clone)]
pub struct RateLimiter {
    records: Arc<Mutex<HashMap<String, RateLimitRecord>>>,
    max_requests: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request from `identifier` and decide whether it may proceed.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    pub fn check_at(&self, identifier: &str, now: Instant) -> RateLimitDecision {
        let mut records = self.records();
        let record = records
            .entry(identifier.to_string())
            .or_insert(RateLimitRecord {
                count: 0,
                reset_time: now + self.window,
            });

        if now > record.reset_time {
            record.count = 0;
            record.reset_time = now + self.window;
        }
        record.count = record.count.saturating_add(1);

        if record.count > self.max_requests {
            RateLimitDecision {
                allowed: false,
                remaining: 0,
                wait_time: record.reset_time.saturating_duration_since(now),
            }
        } else {
            RateLimitDecision {
                allowed: true,
                remaining: self.max_requests - record.count,
                wait_time: Duration::ZERO,
            }
        }
    }

    /// Drop records whose window has already closed.
    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(Instant::now())
    }

    pub fn prune_expired_at(&self, now: Instant) -> usize {
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| now <= record.reset_time);
        before - records.len()
    }

    /// Number of identifiers currently tracked
    pub fn tracked(&self) -> usize {
        self.records().len()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, RateLimitRecord>> {
        // A panic while holding the lock cannot leave a record half-written.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
