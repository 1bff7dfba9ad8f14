//! Per-client request statistics.
//!
//! [`StatsRecorder`] keeps the counters behind
//! [`ApiClient::metrics()`](crate::ApiClient::metrics) and forwards the same
//! events to the `metrics` facade (see [`telemetry`](crate::telemetry)).
//! Successes and failures are recorded once per `execute` call; timeout and
//! rate-limit hits are recorded per event.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::telemetry;

/// Point-in-time copy of a client's request statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Sum of recorded latencies, in seconds.
    pub total_response_time: f64,
    /// `total_response_time / total_requests`, or 0 with no requests.
    pub average_response_time: f64,
    pub rate_limit_hits: u64,
    pub timeout_hits: u64,
    /// Failure count per error kind (e.g. `HTTP_503`, `TIMEOUT`).
    pub error_counts: BTreeMap<String, u64>,
    pub last_request_time: Option<SystemTime>,
}

impl MetricsSnapshot {
    /// Fraction of requests that succeeded, or `None` with no requests.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_requests > 0)
            .then(|| self.successful_requests as f64 / self.total_requests as f64)
    }
}

/// Thread-safe request statistics recorder.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request that produced a response.
    pub fn record_success(&self, operation: &str, latency: Duration) {
        self.record(operation, latency, None);
    }

    /// Record a completed request that failed with `kind`.
    pub fn record_failure(&self, operation: &str, latency: Duration, kind: &str) {
        self.record(operation, latency, Some(kind));
    }

    /// Count one HTTP attempt that timed out.
    pub fn record_timeout_hit(&self, operation: &str) {
        self.lock().timeout_hits += 1;
        metrics::counter!(telemetry::TIMEOUTS_TOTAL, "operation" => operation.to_owned())
            .increment(1);
    }

    /// Count one local or remote rate-limit rejection.
    pub fn record_rate_limit_hit(&self, operation: &str) {
        self.lock().rate_limit_hits += 1;
        metrics::counter!(telemetry::RATE_LIMITED_TOTAL, "operation" => operation.to_owned())
            .increment(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().clone()
    }

    pub fn reset(&self) {
        *self.lock() = MetricsSnapshot::default();
    }

    fn record(&self, operation: &str, latency: Duration, error: Option<&str>) {
        {
            let mut stats = self.lock();
            stats.total_requests += 1;
            match error {
                None => stats.successful_requests += 1,
                Some(kind) => {
                    stats.failed_requests += 1;
                    *stats.error_counts.entry(kind.to_owned()).or_insert(0) += 1;
                }
            }
            stats.total_response_time += latency.as_secs_f64();
            stats.average_response_time =
                stats.total_response_time / stats.total_requests as f64;
            stats.last_request_time = Some(SystemTime::now());
        }

        let status = if error.is_none() { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "operation" => operation.to_owned(),
            "status" => status,
        )
        .increment(1);
        if let Some(kind) = error {
            metrics::counter!(telemetry::ERRORS_TOTAL,
                "operation" => operation.to_owned(),
                "kind" => kind.to_owned(),
            )
            .increment(1);
        }
        if !latency.is_zero() {
            metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
                "operation" => operation.to_owned(),
            )
            .record(latency.as_secs_f64());
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsSnapshot> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
