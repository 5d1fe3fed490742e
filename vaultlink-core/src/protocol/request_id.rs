//! Request identifier generation.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generates identifiers that stay unique for the lifetime of a channel.
///
/// Each id combines a monotonic counter, the wall-clock time in
/// milliseconds and 32 random bits, so two generators started in the same
/// millisecond still diverge.
#[derive(Debug, Default)]
pub struct RequestIdGenerator {
    counter: AtomicU64,
}

impl RequestIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let millis = Utc::now().timestamp_millis();
        let noise: u32 = rand::random();
        format!("{:x}-{:x}-{:08x}", sequence, millis, noise)
    }
}
