//! Huginn - resilient outbound client for inference APIs
//!
//! Huginn turns one logical request ("generate text", "generate image") into
//! at most one successful HTTP exchange with a remote API, shielding callers
//! from transient failures, overload and duplicate cost:
//!
//! - a disk-backed [`ResponseCache`] with expiry and capacity eviction,
//! - a token-bucket [`RateLimiter`] shared by every caller of one client,
//! - a [`CircuitBreaker`] that stops hammering a failing API,
//! - a bounded retry loop with a fixed backoff schedule.
//!
//! Every call resolves to a decoded JSON object or one classified
//! [`HuginnError`].
//!
//! # Example
//!
//! ```rust,no_run
//! use huginn::Huginn;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let client = Huginn::builder()
//!         .api_key("your-together-key")
//!         .build()?;
//!
//!     let response = client
//!         .execute(
//!             "/chat/completions",
//!             &json!({
//!                 "model": "meta-llama/Llama-3.3-70B-Instruct-Turbo-Free",
//!                 "messages": [{"role": "user", "content": "Hello"}],
//!             }),
//!             "text generation",
//!             true,
//!         )
//!         .await?;
//!
//!     println!("{}", response["choices"][0]["message"]["content"]);
//!     println!("{:?}", client.metrics());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod resilience;
pub mod stats;
pub mod telemetry;
pub mod transport;
mod version;

// Re-export main types at crate root
pub use cache::{CacheConfig, ResponseCache};
pub use client::{ApiClient, HealthReport, HealthStatus, Huginn, HuginnBuilder};
pub use config::{ClientConfig, HttpConfig};
pub use error::{HuginnError, Result};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimitConfig, RateLimiter,
    RetryConfig,
};
pub use stats::MetricsSnapshot;
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
pub use version::{PKG_VERSION, user_agent};

// Callers pass these to `execute_with_cancel`.
pub use tokio_util::sync::CancellationToken;
