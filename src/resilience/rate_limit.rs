//! Token-bucket rate limiter shared by every caller of one client.
//!
//! Refill is lazy: tokens accrue only inside [`RateLimiter::try_acquire`],
//! proportional to the time since the previous call. There is no background
//! timer. The bucket starts full.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{HuginnError, Result};

/// Interval between `try_acquire` polls inside [`RateLimiter::acquire`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for the token bucket.
///
/// ```rust
/// # use huginn::RateLimitConfig;
/// # use std::time::Duration;
/// let config = RateLimitConfig::new()
///     .requests_per_minute(120)
///     .burst_size(20)
///     .max_wait(Duration::from_secs(5));
/// assert_eq!(config.burst_size, 20);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained refill rate. Default: 60.
    pub requests_per_minute: u32,
    /// Bucket capacity. Default: 10.
    pub burst_size: u32,
    /// How long `execute` waits for a token. Default: 60s.
    #[serde(rename = "max_wait_secs", with = "crate::config::secs")]
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_size: 10,
            max_wait: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sustained refill rate.
    pub fn requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    /// Set the bucket capacity.
    pub fn burst_size(mut self, burst: u32) -> Self {
        self.burst_size = burst;
        self
    }

    /// Set the maximum time to wait for a token.
    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = wait;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(HuginnError::Configuration(
                "rate_limit.requests_per_minute must be positive".to_string(),
            ));
        }
        if self.burst_size == 0 {
            return Err(HuginnError::Configuration(
                "rate_limit.burst_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket.
///
/// All state lives behind a single mutex, so concurrent callers contend on
/// the same bucket and the configured rate is a ceiling for the whole client.
#[derive(Debug)]
pub struct RateLimiter {
    refill_per_sec: f64,
    capacity: f64,
    bucket: Mutex<TokenBucket>,
}

impl RateLimiter {
    /// Create a full bucket.
    pub fn new(config: &RateLimitConfig) -> Self {
        let capacity = f64::from(config.burst_size);
        Self {
            refill_per_sec: f64::from(config.requests_per_minute) / 60.0,
            capacity,
            bucket: Mutex::new(TokenBucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token if available, without waiting.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait up to `max_wait` for a token, polling every [`POLL_INTERVAL`].
    pub async fn acquire(&self, max_wait: Duration) -> bool {
        self.acquire_or_cancel(max_wait, &CancellationToken::new())
            .await
            .unwrap_or(false)
    }

    /// Like [`acquire`](Self::acquire), but aborts when `cancel` fires.
    ///
    /// Returns `Err(Cancelled)` on cancellation, `Ok(false)` on timeout.
    pub async fn acquire_or_cancel(
        &self,
        max_wait: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        // A wait too long to represent as an instant never expires.
        let deadline = Instant::now().checked_add(max_wait);
        loop {
            if cancel.is_cancelled() {
                return Err(HuginnError::Cancelled);
            }
            if self.try_acquire() {
                return Ok(true);
            }
            let now = Instant::now();
            let pause = match deadline {
                Some(deadline) if now >= deadline => {
                    debug!(max_wait_ms = max_wait.as_millis() as u64, "no token within wait budget");
                    return Ok(false);
                }
                Some(deadline) => POLL_INTERVAL.min(deadline - now),
                None => POLL_INTERVAL,
            };
            tokio::select! {
                _ = cancel.cancelled() => return Err(HuginnError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Current token count after a refill, for inspection.
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.lock();
        self.refill(&mut bucket);
        bucket.tokens
    }

    /// Bucket capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn refill(&self, bucket: &mut TokenBucket) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokenBucket> {
        // A poisoned bucket still holds a valid count.
        self.bucket
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
