mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FailThenSucceed, FlakyEmbedder, TableEmbedder};
use mimir::{
    Backoff, CacheQuery, Embedder, ErrorKind, MimirError, RetryPolicy, RetryingEmbedder,
    SemanticCache, SemanticCacheConfig, UpstreamClient,
};
use tokio::time::Instant;

fn query() -> CacheQuery {
    CacheQuery::new("Which subject?", "What is entropy?")
}

fn rate_limited() -> MimirError {
    MimirError::RateLimited { retry_after: None }
}

fn model_loading() -> MimirError {
    MimirError::Api {
        status: 503,
        message: "Model is loading, please retry".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn retries_on_transient_error_then_succeeds() {
    let inner = Arc::new(FailThenSucceed::new(2, rate_limited));
    let client = UpstreamClient::new(inner.clone(), "gpt-3.5-turbo", RetryPolicy::default()).unwrap();

    let response = client.complete(&query()).await.unwrap();

    assert_eq!(response, "ok");
    assert_eq!(inner.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn always_transient_makes_exactly_six_attempts() {
    let inner = Arc::new(FailThenSucceed::always(rate_limited));
    let client = UpstreamClient::new(inner.clone(), "gpt-3.5-turbo", RetryPolicy::default()).unwrap();

    let start = Instant::now();
    let err = client.complete(&query()).await.unwrap_err();

    assert_eq!(inner.call_count(), 6);
    match &err {
        MimirError::UpstreamUnavailable { attempts, last_error } => {
            assert_eq!(*attempts, 6);
            assert!(last_error.contains("rate limited"));
        }
        other => panic!("expected UpstreamUnavailable, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
    // Five 20s waits between six attempts, none after the last.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(100) && elapsed < Duration::from_secs(101));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_write_no_cache_entry() {
    let embedder = Arc::new(TableEmbedder::new("t", 2, &[("entropy", &[1.0, 0.0])]));
    let cache = SemanticCache::new(embedder, SemanticCacheConfig::new()).unwrap();
    let inner = Arc::new(FailThenSucceed::always(|| MimirError::Http("connection reset".into())));
    let client = UpstreamClient::new(inner.clone(), "gpt-3.5-turbo", RetryPolicy::default()).unwrap();

    let err = cache.resolve(&query(), &client).await.unwrap_err();

    assert!(matches!(err, MimirError::UpstreamUnavailable { attempts: 6, .. }));
    assert_eq!(inner.call_count(), 6);
    assert_eq!(cache.stats().await.entries, 0);
    assert!(cache.lookup(&query()).await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn non_transient_error_fails_immediately() {
    let inner = Arc::new(FailThenSucceed::always(|| MimirError::AuthenticationFailed));
    let client = UpstreamClient::new(inner.clone(), "gpt-3.5-turbo", RetryPolicy::default()).unwrap();

    let err = client.complete(&query()).await.unwrap_err();

    assert!(matches!(err, MimirError::AuthenticationFailed));
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn client_errors_are_not_retried_but_server_errors_are() {
    let bad_request = Arc::new(FailThenSucceed::always(|| MimirError::Api {
        status: 400,
        message: "bad request".into(),
    }));
    let client = UpstreamClient::new(bad_request.clone(), "gpt-4", RetryPolicy::default()).unwrap();
    assert!(client.complete(&query()).await.is_err());
    assert_eq!(bad_request.call_count(), 1);

    let overloaded = Arc::new(FailThenSucceed::new(1, || MimirError::Api {
        status: 503,
        message: "overloaded".into(),
    }));
    let client = UpstreamClient::new(overloaded.clone(), "gpt-4", RetryPolicy::default()).unwrap();
    assert_eq!(client.complete(&query()).await.unwrap(), "ok");
    assert_eq!(overloaded.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_after_hint_overrides_delay() {
    let inner = Arc::new(FailThenSucceed::new(1, || MimirError::RateLimited {
        retry_after: Some(Duration::from_secs(1)),
    }));
    let client = UpstreamClient::new(inner.clone(), "gpt-3.5-turbo", RetryPolicy::default()).unwrap();

    let start = Instant::now();
    client.complete(&query()).await.unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_grows_and_caps() {
    let inner = Arc::new(FailThenSucceed::new(4, rate_limited));
    let policy = RetryPolicy::new()
        .max_attempts(5)
        .delay(Duration::from_secs(1))
        .backoff(Backoff::Exponential {
            max_delay: Duration::from_secs(3),
        });
    let client = UpstreamClient::new(inner.clone(), "gpt-3.5-turbo", policy).unwrap();

    let start = Instant::now();
    client.complete(&query()).await.unwrap();

    // 1 + 2 + 3 (capped) + 3 (capped)
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(9) && elapsed < Duration::from_secs(10));
    assert_eq!(inner.call_count(), 5);
}

#[tokio::test]
async fn disabled_policy_makes_one_attempt() {
    let inner = Arc::new(FailThenSucceed::always(rate_limited));
    let client = UpstreamClient::new(inner.clone(), "gpt-3.5-turbo", RetryPolicy::disabled()).unwrap();

    let err = client.complete(&query()).await.unwrap_err();

    assert!(matches!(err, MimirError::UpstreamUnavailable { attempts: 1, .. }));
    assert_eq!(inner.call_count(), 1);
}

#[test]
fn zero_attempt_policy_is_rejected() {
    let inner = Arc::new(FailThenSucceed::new(0, rate_limited));
    let err = UpstreamClient::new(inner, "gpt-3.5-turbo", RetryPolicy::new().max_attempts(0))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

// ============================================================================
// Embedder retry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn retrying_embedder_waits_out_model_loading() {
    let inner = Arc::new(FlakyEmbedder::new(2, model_loading, &[1.0, 0.0]));
    let embedder = RetryingEmbedder::new(inner.clone(), RetryPolicy::default()).unwrap();

    let start = Instant::now();
    let embedding = embedder.embed("What is entropy?").await.unwrap();

    assert_eq!(embedding.values, vec![1.0, 0.0]);
    assert_eq!(inner.call_count(), 3);
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(40) && elapsed < Duration::from_secs(41));
    assert_eq!(embedder.model(), "flaky-v1");
    assert_eq!(embedder.dimensions(), 2);
}

#[tokio::test(start_paused = true)]
async fn retrying_embedder_gives_up_after_budget() {
    let inner = Arc::new(FlakyEmbedder::always(model_loading, 2));
    let embedder = RetryingEmbedder::new(inner.clone(), RetryPolicy::default()).unwrap();

    let err = embedder.embed("What is entropy?").await.unwrap_err();

    assert!(matches!(err, MimirError::UpstreamUnavailable { attempts: 6, .. }));
    assert_eq!(inner.call_count(), 6);
}

#[tokio::test(start_paused = true)]
async fn retrying_embedder_passes_bad_input_through() {
    let inner = Arc::new(FlakyEmbedder::new(0, model_loading, &[1.0, 0.0]));
    let embedder = RetryingEmbedder::new(inner.clone(), RetryPolicy::default()).unwrap();

    let err = embedder.embed("   ").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(inner.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cache_rides_out_cold_embedding_model() {
    let inner = Arc::new(FlakyEmbedder::new(1, model_loading, &[1.0, 0.0]));
    let embedder = Arc::new(RetryingEmbedder::new(inner.clone(), RetryPolicy::default()).unwrap());
    let cache = SemanticCache::new(embedder, SemanticCacheConfig::new()).unwrap();
    let chat = Arc::new(FailThenSucceed::new(0, rate_limited));
    let client = UpstreamClient::new(chat.clone(), "gpt-3.5-turbo", RetryPolicy::default()).unwrap();

    let resolution = cache.resolve(&query(), &client).await.unwrap();

    assert_eq!(resolution.response_text, "ok");
    assert!(!resolution.was_cache_hit);
    assert_eq!(inner.call_count(), 2);
    assert_eq!(chat.call_count(), 1);
}
