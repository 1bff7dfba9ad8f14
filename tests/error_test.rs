use huginn::{HuginnError, Result, RetryConfig};

#[test]
fn test_error_display() {
    let err = HuginnError::Api {
        status: 503,
        message: "overloaded".to_string(),
    };
    assert_eq!(err.to_string(), "API error (503): overloaded");
    assert!(HuginnError::CircuitOpen.to_string().contains("circuit breaker"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(HuginnError::RateLimited)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Error kinds
// ============================================================================

#[test]
fn kinds_are_stable_labels() {
    let cases = [
        (HuginnError::CircuitOpen, "CIRCUIT_OPEN"),
        (HuginnError::RateLimited, "RATE_LIMITED"),
        (
            HuginnError::Api {
                status: 429,
                message: String::new(),
            },
            "HTTP_429",
        ),
        (HuginnError::Timeout, "TIMEOUT"),
        (HuginnError::Network("reset".into()), "NETWORK_ERROR"),
        (HuginnError::Decode("eof".into()), "DECODE_ERROR"),
        (HuginnError::Cancelled, "CANCELLED"),
        (HuginnError::InvalidInput("x".into()), "INVALID_INPUT"),
        (HuginnError::Configuration("x".into()), "CONFIGURATION"),
    ];
    for (err, kind) in cases {
        assert_eq!(err.kind(), kind);
    }
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(HuginnError::Timeout.is_transient());
    assert!(HuginnError::Network("connection reset".into()).is_transient());
    for status in [408, 429, 500, 502, 503, 504] {
        assert!(
            HuginnError::Api {
                status,
                message: String::new()
            }
            .is_transient(),
            "{status} should be transient"
        );
    }
}

#[test]
fn permanent_errors() {
    assert!(!HuginnError::CircuitOpen.is_transient());
    assert!(!HuginnError::RateLimited.is_transient());
    assert!(!HuginnError::Decode("x".into()).is_transient());
    assert!(!HuginnError::Cancelled.is_transient());
    assert!(
        !HuginnError::Api {
            status: 401,
            message: String::new()
        }
        .is_transient()
    );
}

#[test]
fn status_only_for_api_errors() {
    let err = HuginnError::Api {
        status: 404,
        message: "not found".into(),
    };
    assert_eq!(err.status(), Some(404));
    assert_eq!(HuginnError::Timeout.status(), None);
}

#[test]
fn transient_api_errors_follow_default_retry_policy() {
    let policy = RetryConfig::default();
    for status in 100..600 {
        let err = HuginnError::Api {
            status,
            message: String::new(),
        };
        assert_eq!(err.is_transient(), policy.is_retryable(status), "status {status}");
    }
}
