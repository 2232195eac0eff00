use std::time::Duration;

use mimir::{ErrorKind, MimirError, Result};

#[test]
fn test_error_display() {
    let err = MimirError::UnsupportedModel("gpt-2".to_string());
    assert!(err.to_string().contains("gpt-2"));

    let err = MimirError::DimensionMismatch {
        expected: 384,
        actual: 768,
    };
    assert!(err.to_string().contains("384"));
    assert!(err.to_string().contains("768"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(MimirError::EmptyResponse)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Taxonomy
// ============================================================================

#[test]
fn transient_errors() {
    assert!(MimirError::RateLimited { retry_after: None }.is_transient());
    assert!(MimirError::Http("connection reset".into()).is_transient());
    assert!(MimirError::EmptyResponse.is_transient());
    for status in [408, 429, 500, 502, 503] {
        let err = MimirError::Api {
            status,
            message: "upstream".into(),
        };
        assert!(err.is_transient(), "status {status} should be transient");
        assert_eq!(err.kind(), ErrorKind::TransientUpstream);
    }
}

#[test]
fn non_transient_errors() {
    assert!(!MimirError::AuthenticationFailed.is_transient());
    assert!(!MimirError::InvalidInput("empty".into()).is_transient());
    assert!(!MimirError::UnsupportedModel("x".into()).is_transient());
    assert!(
        !MimirError::UpstreamUnavailable {
            attempts: 6,
            last_error: "rate limited".into()
        }
        .is_transient()
    );
    for status in [400, 404, 422] {
        let err = MimirError::Api {
            status,
            message: "bad request".into(),
        };
        assert!(!err.is_transient(), "status {status} should not be transient");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}

#[test]
fn kinds() {
    assert_eq!(
        MimirError::InvalidInput("x".into()).kind(),
        ErrorKind::InvalidInput
    );
    assert_eq!(MimirError::Dataset("x".into()).kind(), ErrorKind::InvalidInput);
    assert_eq!(
        MimirError::DimensionMismatch {
            expected: 1,
            actual: 2
        }
        .kind(),
        ErrorKind::Configuration
    );
    assert_eq!(
        MimirError::AuthenticationFailed.kind(),
        ErrorKind::Configuration
    );
    assert_eq!(MimirError::Store("x".into()).kind(), ErrorKind::Internal);
}

#[test]
fn embedding_errors_keep_their_class() {
    let err = MimirError::Embedding(Box::new(MimirError::RateLimited { retry_after: None }));
    assert!(err.is_embedding_failure());
    assert_eq!(err.kind(), ErrorKind::TransientUpstream);
    assert!(!err.is_fatal_to_configuration());
    assert!(err.to_string().starts_with("embedding failed: rate limited"));

    let err = MimirError::Embedding(Box::new(MimirError::AuthenticationFailed));
    assert!(err.is_fatal_to_configuration());
    assert!(!MimirError::AuthenticationFailed.is_embedding_failure());
}

#[test]
fn retry_after_only_for_rate_limits() {
    let err = MimirError::RateLimited {
        retry_after: Some(Duration::from_secs(7)),
    };
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert_eq!(MimirError::Http("x".into()).retry_after(), None);
}

#[test]
fn fatal_to_configuration() {
    assert!(MimirError::AuthenticationFailed.is_fatal_to_configuration());
    assert!(MimirError::Store("corrupt".into()).is_fatal_to_configuration());
    assert!(
        !MimirError::UpstreamUnavailable {
            attempts: 6,
            last_error: "x".into()
        }
        .is_fatal_to_configuration()
    );
    assert!(!MimirError::InvalidInput("x".into()).is_fatal_to_configuration());
}

#[test]
fn io_and_json_convert() {
    let io: MimirError = std::io::Error::other("disk full").into();
    assert_eq!(io.kind(), ErrorKind::Internal);

    let json: MimirError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert_eq!(json.kind(), ErrorKind::Internal);
}
