//! Retry policy and the retrying upstream model client.
//!
//! [`RetryPolicy`] is an explicit value handed to [`UpstreamClient::new`]
//! and [`RetryingEmbedder::new`]: attempt count, delay and backoff shape are
//! plain fields. All retrying goes through the shared `with_retry()` helper.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use async_trait::async_trait;

use super::traits::{ChatModel, Embedder};
use crate::telemetry;
use crate::types::{CacheQuery, ChatRequest, Embedding};
use crate::{MimirError, Result};

/// Default number of attempts, including the first request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(20);

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// `delay * 2^attempt`, capped at `max_delay`.
    Exponential { max_delay: Duration },
}

/// Retry policy for transient upstream failures.
///
/// ```rust
/// # use mimir::providers::retry::{Backoff, RetryPolicy};
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .max_attempts(3)
///     .delay(Duration::from_millis(200))
///     .backoff(Backoff::Exponential { max_delay: Duration::from_secs(5) });
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 6.
    pub max_attempts: u32,
    /// Delay before each retry (base delay for exponential backoff). Default: 20s.
    pub delay: Duration,
    /// Delay growth. Default: fixed.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes a single attempt.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the delay between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the backoff shape.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay after the given failed attempt (0-indexed), ignoring server hints.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => self
                .delay
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(max_delay),
        }
    }

    /// Delay honouring a `retry_after` hint from a rate-limited response.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(MimirError::Configuration(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Run `f` until it succeeds, fails permanently, or the budget is spent.
///
/// Transient errors (see [`MimirError::is_transient()`]) are retried with the
/// policy's delay; anything else is returned at once. Exhaustion becomes
/// [`MimirError::UpstreamUnavailable`] carrying the last transient error.
pub(crate) async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    provider: &str,
    operation: &str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..policy.max_attempts {
        let outcome = f().await;
        let status = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::UPSTREAM_REQUESTS_TOTAL,
            "provider" => provider.to_owned(),
            "operation" => operation.to_owned(),
            "status" => status,
        )
        .increment(1);

        match outcome {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                if attempt + 1 < policy.max_attempts {
                    let delay = policy.effective_delay(attempt, e.retry_after());
                    metrics::counter!(telemetry::UPSTREAM_RETRIES_TOTAL,
                        "provider" => provider.to_owned(),
                        "operation" => operation.to_owned(),
                    )
                    .increment(1);
                    warn!(
                        provider,
                        operation,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(MimirError::UpstreamUnavailable {
        attempts: policy.max_attempts,
        last_error: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt made".to_string()),
    })
}

// ============================================================================
// UpstreamClient
// ============================================================================

/// The upstream model as the cache sees it: `complete(query) -> text`.
///
/// Owns the model name, sampling temperature and retry policy; the wrapped
/// [`ChatModel`] performs single attempts.
#[derive(Clone)]
pub struct UpstreamClient {
    inner: Arc<dyn ChatModel>,
    model: String,
    temperature: f32,
    policy: RetryPolicy,
}

impl UpstreamClient {
    /// Wrap a chat model with the given retry policy.
    pub fn new(
        inner: Arc<dyn ChatModel>,
        model: impl Into<String>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        policy.validate()?;
        let model = model.into();
        inner.validate_model(&model)?;
        Ok(Self {
            inner,
            model,
            temperature: 0.0,
            policy,
        })
    }

    /// Set the sampling temperature (default 0).
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Model name sent upstream.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Ask the upstream model to answer `query`, retrying transient failures.
    pub async fn complete(&self, query: &CacheQuery) -> Result<String> {
        let request = ChatRequest::for_query(query, &self.model, self.temperature);
        debug!(provider = self.inner.name(), model = %self.model, "calling upstream");
        with_retry(&self.policy, self.inner.name(), "chat", || {
            self.inner.chat(&request)
        })
        .await
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("provider", &self.inner.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("policy", &self.policy)
            .finish()
    }
}

// ============================================================================
// RetryingEmbedder
// ============================================================================

/// Decorator that retries transient failures of an [`Embedder`].
///
/// Same semantics as [`UpstreamClient::complete`]. Remote embedding services
/// answer 503 while a cold model loads.
pub struct RetryingEmbedder {
    inner: Arc<dyn Embedder>,
    policy: RetryPolicy,
}

impl RetryingEmbedder {
    /// Wrap an embedder with the given retry policy.
    pub fn new(inner: Arc<dyn Embedder>, policy: RetryPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { inner, policy })
    }
}

#[async_trait]
impl Embedder for RetryingEmbedder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        with_retry(&self.policy, self.inner.name(), "embed", || {
            self.inner.embed(text)
        })
        .await
    }
}
