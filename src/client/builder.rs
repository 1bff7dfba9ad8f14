//! Builder for configuring client instances

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::ApiClient;
use crate::cache::{CacheConfig, ResponseCache};
use crate::config::ClientConfig;
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, RateLimitConfig, RateLimiter, RetryConfig,
};
use crate::stats::StatsRecorder;
use crate::transport::{HttpTransport, Transport};
use crate::Result;

/// Main entry point for creating client instances.
pub struct Huginn;

impl Huginn {
    /// Create a new builder for configuring the client.
    pub fn builder() -> HuginnBuilder {
        HuginnBuilder::new()
    }
}

/// Builder for configuring client instances.
///
/// Starts from [`ClientConfig::default()`]; individual setters override one
/// section at a time.
///
/// ```rust,no_run
/// use huginn::{CacheConfig, Huginn};
///
/// # async fn run() -> huginn::Result<()> {
/// let client = Huginn::builder()
///     .api_key("together-key")
///     .cache(CacheConfig::new().dir("/tmp/huginn"))
///     .build()?;
///
/// let response = client
///     .execute(
///         "/chat/completions",
///         &serde_json::json!({"model": "m", "messages": []}),
///         "text generation",
///         true,
///     )
///     .await?;
/// # let _ = response;
/// # Ok(())
/// # }
/// ```
pub struct HuginnBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
}

impl HuginnBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            transport: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the bearer token.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.http.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL endpoints are appended to.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.http.base_url = url.into();
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.http.timeout = timeout;
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.config.retry = config;
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = config;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    /// Configure the response cache.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.config.cache = config;
        self
    }

    /// Run without a response cache.
    pub fn disable_cache(mut self) -> Self {
        self.config.cache.enabled = false;
        self
    }

    /// Use a custom transport instead of the default `reqwest` one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the configuration and assemble the client.
    ///
    /// Opens (and creates) the cache directory when caching is enabled.
    pub fn build(self) -> Result<ApiClient> {
        let config = self.config;
        config.validate()?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                if config.http.api_key.is_none() {
                    warn!(base_url = %config.http.base_url, "no API key configured; requests are sent unauthenticated");
                }
                Arc::new(HttpTransport::new(config.http.api_key.clone())?)
            }
        };

        let cache = if config.cache.enabled {
            Some(ResponseCache::open(&config.cache)?)
        } else {
            None
        };

        info!(
            base_url = %config.http.base_url,
            max_attempts = config.retry.max_attempts,
            requests_per_minute = config.rate_limit.requests_per_minute,
            cache = cache.is_some(),
            "huginn client ready"
        );

        Ok(ApiClient {
            limiter: RateLimiter::new(&config.rate_limit),
            breaker: CircuitBreaker::new(&config.circuit_breaker),
            stats: StatsRecorder::new(),
            transport,
            cache,
            config,
        })
    }
}

impl Default for HuginnBuilder {
    fn default() -> Self {
        Self::new()
    }
}
