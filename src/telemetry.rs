//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install their
//! own `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops. The per-client snapshot returned
//! by [`ApiClient::metrics()`](crate::ApiClient::metrics) is tracked
//! separately and does not depend on a recorder.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `operation`: caller-supplied operation name (e.g. "text generation")
//! - `status`: outcome: "ok" or "error"
//! - `kind`: error kind label (e.g. "HTTP_503", "TIMEOUT")
//! - `state`: breaker state entered: "closed", "open" or "half_open"

/// Completed `execute` cycles.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// Failed `execute` cycles by error kind.
///
/// Labels: `operation`, `kind`.
pub const ERRORS_TOTAL: &str = "huginn_errors_total";

/// Request duration in seconds, cache hits excluded.
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Retry attempts (not counting the initial request).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Individual HTTP attempts that timed out.
///
/// Labels: `operation`.
pub const TIMEOUTS_TOTAL: &str = "huginn_timeouts_total";

/// Requests rejected by the local token bucket or answered with HTTP 429.
///
/// Labels: `operation`.
pub const RATE_LIMITED_TOTAL: &str = "huginn_rate_limited_total";

/// Breaker state transitions.
///
/// Labels: `state`.
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "huginn_circuit_transitions_total";

/// Response cache hits.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Response cache misses (including expired and corrupt entries).
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Entries removed to stay within the cache capacity.
pub const CACHE_EVICTIONS_TOTAL: &str = "huginn_cache_evictions_total";
