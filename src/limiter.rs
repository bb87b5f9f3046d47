//! Global outbound-call rate limiter.
//!
//! One [`RateLimiter`] is shared by every flow through an `Arc`. It keeps a
//! token bucket per API action; [`RateLimiter::acquire`] waits until the
//! bucket for the action has a token and then takes it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::config::RateLimitConfig;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    capacity: f64,
    per_second: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: u32, per_second: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            capacity: f64::from(capacity),
            per_second: f64::from(per_second.max(1)),
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.per_second).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token, or return how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }
        let missing = 1.0 - self.tokens;
        Err(Duration::from_secs_f64(missing / self.per_second))
    }
}

/// Per-action token bucket limiter, safe to share between flows.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create a limiter from rate limit settings.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for and take a token for `action`.
    pub async fn acquire(&self, action: &str) {
        loop {
            let wait = match self.try_acquire_at(action, Instant::now()) {
                Ok(()) => return,
                Err(wait) => wait,
            };
            trace!(action, wait_ms = wait.as_millis() as u64, "rate limited");
            tokio::time::sleep(wait).await;
        }
    }

    /// Take a token for `action` if one is available right now.
    pub fn try_acquire(&self, action: &str) -> bool {
        self.try_acquire_at(action, Instant::now()).is_ok()
    }

    fn try_acquire_at(&self, action: &str, now: Instant) -> Result<(), Duration> {
        // A panic while holding the lock leaves the buckets consistent.
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buckets
            .entry(action.to_string())
            .or_insert_with(|| {
                Bucket::new(
                    self.config.capacity_for(action),
                    self.config.rate_for(action),
                    now,
                )
            })
            .try_take(now)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
