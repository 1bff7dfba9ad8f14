//! Client configuration.
//!
//! [`ClientConfig`] is built once and handed to
//! [`HuginnBuilder`](crate::HuginnBuilder); nothing re-reads the environment
//! after construction. Sources, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. A TOML file ([`ClientConfig::load`]):
//!    `--config <path>`, then `~/.huginn/config.toml`, then
//!    `/etc/huginn/config.toml`
//! 3. Environment variables ([`ClientConfig::apply_env`])
//!
//! ```toml
//! [http]
//! base_url = "https://api.together.xyz/v1"
//! timeout_secs = 60
//!
//! [retry]
//! max_attempts = 5
//! retryable_status_codes = [408, 429, 500, 502, 503, 504]
//! backoff_secs = [30, 60, 90, 120, 150]
//!
//! [rate_limit]
//! requests_per_minute = 60
//! burst_size = 10
//! max_wait_secs = 60
//!
//! [cache]
//! dir = "/var/cache/huginn"
//! max_entries = 1000
//! ttl_secs = 86400
//!
//! [circuit_breaker]
//! failure_threshold = 5
//! timeout_secs = 60
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use crate::{HuginnError, Result};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";

/// Endpoint and authentication settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,
    /// Bearer token. Never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Per-attempt timeout. Default: 60s.
    #[serde(rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }
}

impl std::fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub http: HttpConfig,
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Environment variables recognised by [`ClientConfig::apply_env`].
pub const ENV_VARS: &[&str] = &[
    "TOGETHER_API_KEY",
    "TOGETHER_API_BASE",
    "API_TIMEOUT",
    "API_MAX_RETRIES",
    "RETRYABLE_STATUS_CODES",
    "API_RATE_LIMIT_RPM",
    "API_RATE_LIMIT_BURST",
    "API_CACHE_DIR",
    "API_CACHE_MAX_ENTRIES",
    "API_CACHE_TTL_SECS",
    "API_CIRCUIT_THRESHOLD",
    "API_CIRCUIT_TIMEOUT_SECS",
];

impl ClientConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided; must exist)
    /// 2. `~/.huginn/config.toml`
    /// 3. `/etc/huginn/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::from_file(&path)
    }

    /// Like [`load`](Self::load), but falls back to defaults when no
    /// explicit path is given and no standard file exists.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match explicit_path {
            Some(_) => Self::load(explicit_path),
            None => match Self::standard_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            HuginnError::Configuration(msg) => {
                HuginnError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse TOML config text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HuginnError::Configuration(format!("Failed to parse config: {e}")))
    }

    /// Overlay settings from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay settings from `lookup`, which maps a variable name to its
    /// value. See [`ENV_VARS`] for the recognised names.
    pub fn apply_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(key) = lookup("TOGETHER_API_KEY").filter(|k| !k.is_empty()) {
            self.http.api_key = Some(key);
        }
        if let Some(base) = lookup("TOGETHER_API_BASE") {
            self.http.base_url = base;
        }
        if let Some(v) = lookup("API_TIMEOUT") {
            self.http.timeout = Duration::from_secs(parse_env("API_TIMEOUT", &v)?);
        }
        if let Some(v) = lookup("API_MAX_RETRIES") {
            self.retry.max_attempts = parse_env("API_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("RETRYABLE_STATUS_CODES") {
            self.retry.retryable_status_codes = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_env("RETRYABLE_STATUS_CODES", s))
                .collect::<Result<_>>()?;
        }
        if let Some(v) = lookup("API_RATE_LIMIT_RPM") {
            self.rate_limit.requests_per_minute = parse_env("API_RATE_LIMIT_RPM", &v)?;
        }
        if let Some(v) = lookup("API_RATE_LIMIT_BURST") {
            self.rate_limit.burst_size = parse_env("API_RATE_LIMIT_BURST", &v)?;
        }
        if let Some(dir) = lookup("API_CACHE_DIR") {
            self.cache.dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("API_CACHE_MAX_ENTRIES") {
            self.cache.max_entries = parse_env("API_CACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = lookup("API_CACHE_TTL_SECS") {
            self.cache.ttl = Duration::from_secs(parse_env("API_CACHE_TTL_SECS", &v)?);
        }
        if let Some(v) = lookup("API_CIRCUIT_THRESHOLD") {
            self.circuit_breaker.failure_threshold = parse_env("API_CIRCUIT_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("API_CIRCUIT_TIMEOUT_SECS") {
            self.circuit_breaker.timeout =
                Duration::from_secs(parse_env("API_CIRCUIT_TIMEOUT_SECS", &v)?);
        }
        Ok(self)
    }

    /// Check every section for values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.http.base_url.is_empty() {
            return Err(HuginnError::Configuration(
                "http.base_url must not be empty".to_string(),
            ));
        }
        if self.http.timeout.is_zero() {
            return Err(HuginnError::Configuration(
                "http.timeout_secs must be positive".to_string(),
            ));
        }
        self.retry.validate()?;
        self.rate_limit.validate()?;
        self.cache.validate()?;
        self.circuit_breaker.validate()
    }

    /// Render as TOML (the API key is never included).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| HuginnError::Configuration(format!("Failed to render config: {e}")))
    }

    fn standard_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".huginn").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/huginn/config.toml"));
        paths
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Self::standard_paths()
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| {
                HuginnError::Configuration(
                    "No config file found. Create ~/.huginn/config.toml or /etc/huginn/config.toml"
                        .to_string(),
                )
            })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        HuginnError::Configuration(format!("invalid value {value:?} for {name}: {e}"))
    })
}

/// Serde helper: `Duration` as a number of seconds (fractions allowed).
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Serde helper: `Vec<Duration>` as a list of seconds.
pub(crate) mod secs_list {
    use std::time::Duration;

    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(list: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(list.len()))?;
        for d in list {
            seq.serialize_element(&d.as_secs_f64())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        Vec::<f64>::deserialize(d)?
            .into_iter()
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .collect()
    }
}
