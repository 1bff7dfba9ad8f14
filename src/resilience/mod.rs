//! Failure-isolation primitives composed by [`ApiClient`](crate::ApiClient).
//!
//! - [`rate_limit::RateLimiter`]: token bucket with lazy refill.
//! - [`circuit_breaker::CircuitBreaker`]: closed/open/half-open gate.
//! - [`retry::RetryConfig`]: attempt budget and fixed backoff schedule.
//!
//! Each component owns its own lock; there is no cross-component
//! transaction.

pub mod circuit_breaker;
pub mod rate_limit;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::RetryConfig;
