//! Retry policy: attempt budget, retryable status set and backoff schedule.
//!
//! Unlike an exponential policy, the backoff here is a fixed, ordered list of
//! waits indexed by attempt number. The default escalates flatly:
//! 30s, 60s, 90s, 120s, 150s.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{HuginnError, Result};

/// Status codes retried by default.
pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Configuration for retry behaviour on transient failures.
///
/// ```rust
/// # use huginn::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(3)
///     .backoff(vec![Duration::from_secs(1), Duration::from_secs(2)]);
/// assert!(config.validate().is_ok());
/// assert!(config.is_retryable(503));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 5.
    pub max_attempts: u32,
    /// Status codes that are retried. Default: 408, 429, 500, 502, 503, 504.
    pub retryable_status_codes: Vec<u16>,
    /// Wait before retry `n` (0-indexed). Must hold at least
    /// `max_attempts - 1` entries.
    #[serde(rename = "backoff_secs", with = "crate::config::secs_list")]
    pub backoff: Vec<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.to_vec(),
            backoff: [30, 60, 90, 120, 150]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}

impl RetryConfig {
    /// Create a new config with the default schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Replace the retryable status set.
    pub fn retryable_status_codes(mut self, codes: impl Into<Vec<u16>>) -> Self {
        self.retryable_status_codes = codes.into();
        self
    }

    /// Replace the backoff schedule.
    pub fn backoff(mut self, schedule: impl Into<Vec<Duration>>) -> Self {
        self.backoff = schedule.into();
        self
    }

    /// Whether a response with this status should be retried.
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Wait before the retry that follows attempt `attempt` (0-indexed).
    ///
    /// Falls back to the last schedule entry past the end of the list, and
    /// to zero for an empty schedule.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff
            .get(attempt as usize)
            .or_else(|| self.backoff.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Check the attempt budget against the schedule length.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(HuginnError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        let needed = (self.max_attempts - 1) as usize;
        if self.backoff.len() < needed {
            return Err(HuginnError::Configuration(format!(
                "retry.backoff_secs has {} entries but max_attempts = {} needs at least {needed}",
                self.backoff.len(),
                self.max_attempts
            )));
        }
        Ok(())
    }
}
