use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Tracked keys above which expired records are pruned on the next check.
const HIGH_WATER: usize = 1000;

#[derive(Debug, Clone, Copy)]
struct RateLimitRecord {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window counter per key. Every attempt counts, allowed or not.
pub struct RateLimiter {
    max: u32,
    window: Duration,
    records: DashMap<String, RateLimitRecord>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            records: DashMap::new(),
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub fn allow_at(&self, key: &str, now: Instant) -> bool {
        if self.records.len() > HIGH_WATER {
            self.records.retain(|_, r| now < r.reset_at);
        }

        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert(RateLimitRecord {
                count: 0,
                reset_at: now + self.window,
            });

        if now >= record.reset_at {
            record.count = 0;
            record.reset_at = now + self.window;
        }

        record.count = record.count.saturating_add(1);
        record.count <= self.max
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}
