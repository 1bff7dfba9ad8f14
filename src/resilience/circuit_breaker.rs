//! Three-state circuit breaker gating network attempts.
//!
//! ```text
//!            failures >= threshold
//!   Closed ─────────────────────────► Open
//!     ▲                                │ allow() after timeout
//!     │ on_success()                   ▼
//!     └────────────────────────── HalfOpen
//!              on_failure() with failures >= threshold ──► Open
//! ```
//!
//! The consecutive-failure counter is only reset by a success. It is carried
//! across Open → HalfOpen, so the first failed trial in HalfOpen re-opens the
//! breaker immediately.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::telemetry;
use crate::{HuginnError, Result};

/// Breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker. Default: 5.
    pub failure_threshold: u32,
    /// Time the breaker stays open before a trial is allowed. Default: 60s.
    #[serde(rename = "timeout_secs", with = "crate::config::secs")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(HuginnError::Configuration(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn label(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Thread-safe circuit breaker. Never fails; it only answers whether an
/// attempt may proceed.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            threshold: config.failure_threshold,
            timeout: config.timeout,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
            }),
        }
    }

    /// Whether a request may be attempted now.
    ///
    /// In `Open`, returns `true` (and moves to `HalfOpen`) only once strictly
    /// more than `timeout` has passed since the last failure.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = inner
                    .last_failure
                    .is_none_or(|at| Instant::now().saturating_duration_since(at) > self.timeout);
                if expired {
                    Self::transition(&mut inner, CircuitState::HalfOpen);
                }
                expired
            }
        }
    }

    /// Record a successful outcome.
    pub fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            Self::transition(&mut inner, CircuitState::Closed);
        }
        inner.consecutive_failures = 0;
    }

    /// Record a failed outcome.
    pub fn on_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        if inner.consecutive_failures >= self.threshold && inner.state != CircuitState::Open {
            warn!(
                failures = inner.consecutive_failures,
                timeout_secs = self.timeout.as_secs_f64(),
                "circuit breaker opened"
            );
            Self::transition(&mut inner, CircuitState::Open);
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    fn transition(inner: &mut BreakerState, to: CircuitState) {
        if inner.state != to {
            info!(from = %inner.state, to = %to, "circuit breaker transition");
            metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL, "state" => to.label())
                .increment(1);
            inner.state = to;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
