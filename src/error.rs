//! Huginn error types

use crate::resilience::retry::DEFAULT_RETRYABLE_STATUS_CODES;

/// Classified outcome of a failed request.
///
/// Every [`ApiClient::execute`](crate::ApiClient::execute) call resolves to
/// either a decoded response or exactly one of these variants. Transport
/// details never leak past this boundary.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HuginnError {
    // Policy gates
    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("rate limited: no request token available within the wait budget")]
    RateLimited,

    // Remote/transport failures
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    /// HTTP 200 whose body was not a JSON object.
    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request cancelled")]
    Cancelled,

    // Caller/configuration errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl HuginnError {
    /// Whether this error would be retried under the default policy.
    ///
    /// `Api` errors are judged against
    /// [`DEFAULT_RETRYABLE_STATUS_CODES`] only. A client configured with a
    /// different set (`retry.retryable_status_codes`,
    /// `RETRYABLE_STATUS_CODES`) decides with
    /// [`RetryConfig::is_retryable`](crate::RetryConfig::is_retryable)
    /// instead.
    pub fn is_transient(&self) -> bool {
        match self {
            HuginnError::Timeout | HuginnError::Network(_) => true,
            HuginnError::Api { status, .. } => DEFAULT_RETRYABLE_STATUS_CODES.contains(status),
            _ => false,
        }
    }

    /// HTTP status code, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            HuginnError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Stable label used as the error-kind key in metrics.
    pub fn kind(&self) -> String {
        match self {
            HuginnError::CircuitOpen => "CIRCUIT_OPEN".to_string(),
            HuginnError::RateLimited => "RATE_LIMITED".to_string(),
            HuginnError::Api { status, .. } => format!("HTTP_{status}"),
            HuginnError::Timeout => "TIMEOUT".to_string(),
            HuginnError::Network(_) => "NETWORK_ERROR".to_string(),
            HuginnError::Decode(_) => "DECODE_ERROR".to_string(),
            HuginnError::Cancelled => "CANCELLED".to_string(),
            HuginnError::InvalidInput(_) => "INVALID_INPUT".to_string(),
            HuginnError::Configuration(_) => "CONFIGURATION".to_string(),
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
