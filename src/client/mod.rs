//! The resilient request orchestrator.
//!
//! [`ApiClient::execute`] wraps one logical API call in the full policy
//! stack:
//!
//! ```text
//! execute(endpoint, payload, operation, cache_eligible)
//!     │
//!     ▼
//! CircuitBreaker::allow() ──── false ──► Err(CircuitOpen)
//!     │
//!     ▼
//! ResponseCache::lookup() ──── hit ────► Ok(cached)     (cache-eligible only)
//!     │
//!     ▼
//! RateLimiter::acquire() ───── timeout ► Err(RateLimited)
//!     │
//!     ▼
//! attempt 1..=max_attempts ─── retryable failure ─► sleep(backoff[n]) ─┐
//!     │        ▲                                                       │
//!     │        └───────────────────────────────────────────────────────┘
//!     ▼
//! breaker / cache / stats update ──► Ok(response) | Err(classified)
//! ```
//!
//! Clients are cheap to share: wrap in `Arc` and call from as many tasks as
//! needed. The limiter, breaker, cache and stats each serialize on their own
//! lock.

mod builder;

pub use builder::{Huginn, HuginnBuilder};

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::cache::ResponseCache;
use crate::config::ClientConfig;
use crate::resilience::{CircuitBreaker, CircuitState, RateLimiter};
use crate::stats::{MetricsSnapshot, StatsRecorder};
use crate::telemetry;
use crate::transport::{Transport, TransportError};
use crate::{HuginnError, Result};

/// Longest slice of an error body kept in [`HuginnError::Api`] messages.
const ERROR_BODY_LIMIT: usize = 200;

/// Endpoint queried by [`ApiClient::health_check`].
const HEALTH_ENDPOINT: &str = "/models";

/// Resilient client for one remote API.
///
/// Built with [`Huginn::builder()`].
pub struct ApiClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    cache: Option<ResponseCache>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    stats: StatsRecorder,
}

/// Overall verdict of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of [`ApiClient::health_check`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Round-trip time in seconds, when a response arrived.
    pub response_time: Option<f64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub circuit_state: CircuitState,
}

impl ApiClient {
    /// Perform one API operation under cache, rate-limit and breaker policy.
    ///
    /// `endpoint` is appended to the configured base URL. `operation` only
    /// labels logs and metrics. Only `cache_eligible` requests read or write
    /// the response cache.
    pub async fn execute<P: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        payload: &P,
        operation: &str,
        cache_eligible: bool,
    ) -> Result<Value> {
        self.execute_with_cancel(
            endpoint,
            payload,
            operation,
            cache_eligible,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like [`execute`](Self::execute), but aborts the rate-limit wait, an
    /// in-flight attempt or a backoff sleep as soon as `cancel` fires,
    /// returning [`HuginnError::Cancelled`].
    #[instrument(skip(self, payload, cancel))]
    pub async fn execute_with_cancel<P: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        payload: &P,
        operation: &str,
        cache_eligible: bool,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| HuginnError::InvalidInput(format!("payload is not serializable: {e}")))?;

        if !self.breaker.allow() {
            warn!(operation, endpoint, "circuit breaker open, request rejected");
            return Err(HuginnError::CircuitOpen);
        }

        let cache = self.cache.as_ref().filter(|_| cache_eligible);
        if let Some(cache) = cache {
            if let Some(cached) = cache.lookup(endpoint, &payload).await {
                info!(operation, endpoint, "served from cache");
                self.stats.record_success(operation, Duration::ZERO);
                return Ok(cached);
            }
        }

        let start = Instant::now();
        match self
            .limiter
            .acquire_or_cancel(self.config.rate_limit.max_wait, cancel)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(operation, endpoint, "rate limit wait budget exhausted");
                self.stats.record_rate_limit_hit(operation);
                let err = HuginnError::RateLimited;
                self.stats
                    .record_failure(operation, start.elapsed(), &err.kind());
                return Err(err);
            }
            Err(err) => {
                self.stats
                    .record_failure(operation, start.elapsed(), &err.kind());
                return Err(err);
            }
        }

        let result = self
            .send_with_retry(endpoint, &payload, operation, cancel)
            .await;
        let latency = start.elapsed();

        match &result {
            Ok(response) => {
                if let Some(cache) = cache {
                    cache.store(endpoint, &payload, response).await;
                }
                self.breaker.on_success();
                self.stats.record_success(operation, latency);
                info!(operation, latency_ms = latency.as_millis() as u64, "request succeeded");
            }
            Err(HuginnError::Cancelled) => {
                info!(operation, "request cancelled");
                self.stats
                    .record_failure(operation, latency, &HuginnError::Cancelled.kind());
            }
            Err(err) => {
                self.breaker.on_failure();
                self.stats.record_failure(operation, latency, &err.kind());
            }
        }
        result
    }

    /// The attempt loop: retry transient failures on the fixed schedule.
    async fn send_with_retry(
        &self,
        endpoint: &str,
        payload: &Value,
        operation: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let url = join_url(&self.config.http.base_url, endpoint);
        let retry = &self.config.retry;
        let mut last_err = None;

        for attempt in 0..retry.max_attempts {
            info!(
                operation,
                attempt = attempt + 1,
                max_attempts = retry.max_attempts,
                "sending request"
            );
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(HuginnError::Cancelled),
                outcome = self.transport.post_json(&url, payload, self.config.http.timeout) => outcome,
            };

            let err = match outcome {
                Ok(response) if response.status == 200 => return decode_body(&response.body),
                Ok(response) => {
                    if response.status == 429 {
                        self.stats.record_rate_limit_hit(operation);
                    }
                    let err = HuginnError::Api {
                        status: response.status,
                        message: truncate(&response.body, ERROR_BODY_LIMIT),
                    };
                    if !retry.is_retryable(response.status) {
                        error!(operation, status = response.status, error = %err, "non-retryable API error");
                        return Err(err);
                    }
                    err
                }
                Err(TransportError::Timeout) => {
                    self.stats.record_timeout_hit(operation);
                    HuginnError::Timeout
                }
                Err(e) => e.into(),
            };

            if attempt + 1 < retry.max_attempts {
                let delay = retry.delay_for_attempt(attempt);
                metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => operation.to_owned())
                    .increment(1);
                warn!(
                    operation,
                    attempt = attempt + 1,
                    max_attempts = retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying after transient error"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(HuginnError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            } else {
                error!(operation, attempts = retry.max_attempts, error = %err, "giving up after retries");
            }
            last_err = Some(err);
        }

        Err(last_err.unwrap_or_else(|| {
            HuginnError::Configuration("retry.max_attempts must be at least 1".to_string())
        }))
    }

    /// Check the API without touching breaker, limiter, cache or stats.
    pub async fn health_check(&self) -> HealthReport {
        let url = join_url(&self.config.http.base_url, HEALTH_ENDPOINT);
        let start = Instant::now();
        let outcome = self.transport.get(&url, self.config.http.timeout).await;
        let elapsed = start.elapsed().as_secs_f64();
        let circuit_state = self.breaker.state();

        match outcome {
            Ok(response) if response.status == 200 => HealthReport {
                status: HealthStatus::Healthy,
                response_time: Some(elapsed),
                status_code: Some(response.status),
                error: None,
                circuit_state,
            },
            Ok(response) => HealthReport {
                status: HealthStatus::Unhealthy,
                response_time: Some(elapsed),
                status_code: Some(response.status),
                error: Some(format!(
                    "HTTP {}: {}",
                    response.status,
                    truncate(&response.body, ERROR_BODY_LIMIT)
                )),
                circuit_state,
            },
            Err(err) => HealthReport {
                status: HealthStatus::Unhealthy,
                response_time: None,
                status_code: None,
                error: Some(err.to_string()),
                circuit_state,
            },
        }
    }

    /// Snapshot of this client's request statistics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.stats.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.stats.reset();
    }

    /// Current circuit breaker state.
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Drop every cached response. No-op without a cache.
    pub async fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear().await;
        }
    }

    /// The response cache, if enabled.
    pub fn cache(&self) -> Option<&ResponseCache> {
        self.cache.as_ref()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

/// Decode a 200 body; anything but a JSON object is a decode failure.
fn decode_body(body: &str) -> Result<Value> {
    match serde_json::from_str::<Value>(body) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(HuginnError::Decode(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
        Err(e) => Err(HuginnError::Decode(e.to_string())),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn join_url(base: &str, endpoint: &str) -> String {
    let base = base.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.is_empty() {
        return "No response text".to_string();
    }
    text.chars().take(limit).collect()
}
