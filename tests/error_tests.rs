//! Tests for the error system.

use orbit::error::unified::*;
use orbit::error::*;

#[test]
fn error_api_creation() {
    let err = OrbitError::api(404, "Not found");
    assert!(matches!(&err, OrbitError::Api { status: 404, .. }));
    assert_eq!(err.to_string(), "API error (status 404): Not found");
}

#[test]
fn error_helper_mappings_are_stable_for_major_variants() {
    struct Case {
        error: OrbitError,
        expected_category: ErrorCategory,
        expected_retryable: bool,
        expected_recovery: RecoverySuggestion,
    }

    let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk");
    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();

    let cases = vec![
        Case {
            error: OrbitError::RateLimited {
                retry_after_ms: Some(1000),
            },
            expected_category: ErrorCategory::RateLimit,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: OrbitError::Timeout(5000),
            expected_category: ErrorCategory::Timeout,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::IncreaseTimeout,
        },
        Case {
            error: OrbitError::Configuration("bad-config".to_string()),
            expected_category: ErrorCategory::Configuration,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckConfiguration,
        },
        Case {
            error: OrbitError::Stream("connection reset".to_string()),
            expected_category: ErrorCategory::Network,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: OrbitError::Serialization(serde_error),
            expected_category: ErrorCategory::Serialization,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ContactSupport,
        },
        Case {
            error: OrbitError::ToolExecution {
                tool_name: "tool-a".to_string(),
                message: "failed".to_string(),
            },
            expected_category: ErrorCategory::ToolExecution,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckToolImplementation,
        },
        Case {
            error: OrbitError::UnknownTool("tool-b".to_string()),
            expected_category: ErrorCategory::ToolExecution,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckToolImplementation,
        },
        Case {
            error: OrbitError::Concurrency("busy".to_string()),
            expected_category: ErrorCategory::Concurrency,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::WaitForIdle,
        },
        Case {
            error: OrbitError::ContextOverflow("cannot trim".to_string()),
            expected_category: ErrorCategory::Overflow,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ReduceInputSize,
        },
        Case {
            error: OrbitError::MaxCyclesExceeded { max_cycles: 3 },
            expected_category: ErrorCategory::Overflow,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ReduceInputSize,
        },
        Case {
            error: OrbitError::api(401, "Unauthorized"),
            expected_category: ErrorCategory::Authentication,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::CheckCredentials,
        },
        Case {
            error: OrbitError::api(503, "Server unavailable"),
            expected_category: ErrorCategory::Server,
            expected_retryable: true,
            expected_recovery: RecoverySuggestion::RetryWithBackoff,
        },
        Case {
            error: OrbitError::api(418, "Teapot"),
            expected_category: ErrorCategory::Api,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ContactSupport,
        },
        Case {
            error: OrbitError::Io(io_error),
            expected_category: ErrorCategory::Unknown,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ContactSupport,
        },
        Case {
            error: OrbitError::Hook {
                stage: "before_model_call".to_string(),
                message: "policy engine down".to_string(),
            },
            expected_category: ErrorCategory::Unknown,
            expected_retryable: false,
            expected_recovery: RecoverySuggestion::ContactSupport,
        },
    ];

    for case in cases {
        assert_eq!(case.error.category(), case.expected_category);
        assert_eq!(case.error.is_retryable(), case.expected_retryable);
        assert_eq!(case.error.recovery_suggestion(), case.expected_recovery);
    }
}

#[test]
fn cycle_limit_message_names_the_limit() {
    let err = OrbitError::MaxCyclesExceeded { max_cycles: 7 };
    assert_eq!(
        err.to_string(),
        "Cycle limit exceeded: more than 7 cycles in one invocation"
    );
}
