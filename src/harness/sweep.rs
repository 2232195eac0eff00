//! The (embedding provider × threshold) sweep.
//!
//! For every configuration the sweep builds a fresh [`SemanticCache`], replays
//! the dataset once straight to upstream and once through the cache, and
//! records per-row latency and correctness. Configurations are independent
//! and may run concurrently; the report keeps configuration order.
//!
//! Cancellation and the sweep timeout are checked before a configuration
//! starts. A configuration that started always runs to completion (or
//! aborts on a fatal error).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use super::dataset::{Dataset, Row};
use super::report::{ConfigurationReport, ConfigurationStatus, Mode, RowOutcome, SweepReport};
use crate::cache::{DistanceMetric, SemanticCache, SemanticCacheConfig};
use crate::providers::{EmbedderFactory, EmbedderSpec, UpstreamClient};
use crate::telemetry;
use crate::types::CacheQuery;
use crate::{ErrorKind, MimirError, Result};

/// Task instruction of the subject-classification benchmark.
pub const DEFAULT_TASK: &str = "About what subject is the question given below. Your answer must be one of Chemistry, Computer Science (cs), Geography, Math, Physics. \n Answer in one word only. \n Subject:";

/// System prompt of the subject-classification benchmark.
pub const DEFAULT_SWEEP_SYSTEM_PROMPT: &str =
    "You are a helpful assistant whose job it is to answer the questions you are asked.";

/// Sweep settings.
///
/// ```rust
/// # use mimir::harness::SweepConfig;
/// # use mimir::providers::EmbedderSpec;
/// let config = SweepConfig::new()
///     .embedders(vec![EmbedderSpec::local(), EmbedderSpec::remote()])
///     .thresholds(vec![0.05, 0.1, 0.2]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    pub embedders: Vec<EmbedderSpec>,
    pub thresholds: Vec<f32>,
    /// Instruction shared by every row; each row's question is the context.
    pub task: String,
    pub system_prompt: Option<String>,
    pub metric: DistanceMetric,
    /// Configurations run at once. Default: 1.
    pub parallelism: usize,
    /// No configuration starts after this much time has passed.
    pub timeout: Option<Duration>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            embedders: vec![EmbedderSpec::remote()],
            thresholds: vec![0.05, 0.1, 0.2, 0.3],
            task: DEFAULT_TASK.to_string(),
            system_prompt: Some(DEFAULT_SWEEP_SYSTEM_PROMPT.to_string()),
            metric: DistanceMetric::Cosine,
            parallelism: 1,
            timeout: None,
        }
    }
}

impl SweepConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn embedders(mut self, embedders: Vec<EmbedderSpec>) -> Self {
        self.embedders = embedders;
        self
    }

    pub fn thresholds(mut self, thresholds: Vec<f32>) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    pub fn system_prompt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn parallelism(mut self, n: usize) -> Self {
        self.parallelism = n;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedders.is_empty() {
            return Err(MimirError::Configuration(
                "sweep needs at least one embedder".to_string(),
            ));
        }
        if self.thresholds.is_empty() {
            return Err(MimirError::Configuration(
                "sweep needs at least one threshold".to_string(),
            ));
        }
        if self.task.trim().is_empty() {
            return Err(MimirError::Configuration(
                "sweep task must not be empty".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(MimirError::Configuration(
                "sweep parallelism must be at least 1".to_string(),
            ));
        }
        for &threshold in &self.thresholds {
            SemanticCacheConfig::new()
                .threshold(threshold)
                .metric(self.metric)
                .validate()?;
        }
        Ok(())
    }

    /// Every configuration in run order: embedders outer, thresholds inner.
    pub fn points(&self) -> Vec<SweepPoint> {
        self.embedders
            .iter()
            .flat_map(|embedder| {
                self.thresholds.iter().map(move |&threshold| SweepPoint {
                    embedder: embedder.clone(),
                    threshold,
                })
            })
            .collect()
    }
}

/// One configuration of the sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepPoint {
    pub embedder: EmbedderSpec,
    pub threshold: f32,
}

/// Cooperative cancellation flag, shared by clones.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum Skipped {
    Cancelled,
    TimedOut,
}

/// Runs a [`SweepConfig`] against a dataset.
#[derive(Debug, Clone)]
pub struct Sweep {
    config: SweepConfig,
}

impl Sweep {
    pub fn new(config: SweepConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run every configuration and collect the report.
    ///
    /// Errors only for an empty dataset; problems inside a configuration
    /// are recorded in that configuration's status.
    pub async fn run(
        &self,
        dataset: &Dataset,
        upstream: &UpstreamClient,
        factory: &dyn EmbedderFactory,
        cancel: &CancelToken,
    ) -> Result<SweepReport> {
        if dataset.is_empty() {
            return Err(MimirError::InvalidInput("dataset has no rows".to_string()));
        }

        let points = self.config.points();
        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        info!(
            configurations = points.len(),
            rows = dataset.len(),
            parallelism = self.config.parallelism,
            "starting sweep"
        );

        // `buffered` starts futures lazily as slots free up, so the checks at
        // the top of each future happen when that configuration would start.
        let results: Vec<std::result::Result<ConfigurationReport, Skipped>> =
            stream::iter(points)
                .map(|point| async move {
                    if cancel.is_cancelled() {
                        return Err(Skipped::Cancelled);
                    }
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(Skipped::TimedOut);
                    }
                    Ok(self.run_point(point, dataset, upstream, factory).await)
                })
                .buffered(self.config.parallelism)
                .collect()
                .await;

        let mut report = SweepReport::default();
        for result in results {
            match result {
                Ok(configuration) => report.configurations.push(configuration),
                Err(Skipped::Cancelled) => report.cancelled = true,
                Err(Skipped::TimedOut) => report.timed_out = true,
            }
        }
        if report.cancelled {
            warn!("sweep cancelled");
        }
        if report.timed_out {
            warn!("sweep timed out");
        }
        info!(
            completed = report
                .configurations
                .iter()
                .filter(|c| c.is_completed())
                .count(),
            "sweep finished"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(embedder = %point.embedder, threshold = point.threshold))]
    async fn run_point(
        &self,
        point: SweepPoint,
        dataset: &Dataset,
        upstream: &UpstreamClient,
        factory: &dyn EmbedderFactory,
    ) -> ConfigurationReport {
        info!("configuration started");
        let mut outcomes = Vec::with_capacity(dataset.len() * 2);
        let mut model = point.embedder.model.clone();

        let status = match self
            .replay(&point, dataset, upstream, factory, &mut outcomes, &mut model)
            .await
        {
            Ok(()) => ConfigurationStatus::Completed,
            Err(e) => {
                warn!(error = %e, "configuration aborted");
                ConfigurationStatus::Aborted {
                    reason: e.to_string(),
                }
            }
        };

        let report = ConfigurationReport::build(
            point.embedder.provider,
            model,
            point.threshold,
            dataset.len(),
            outcomes,
            status,
        );
        info!(
            accuracy_cached = report.accuracy_cached,
            accuracy_uncached = report.accuracy_uncached,
            latency_cached = report.latency_cached_seconds,
            latency_uncached = report.latency_uncached_seconds,
            cache_hits = report.cache_hits,
            "configuration finished"
        );
        report
    }

    /// Both passes of one configuration. Returns the error that aborted it.
    async fn replay(
        &self,
        point: &SweepPoint,
        dataset: &Dataset,
        upstream: &UpstreamClient,
        factory: &dyn EmbedderFactory,
        outcomes: &mut Vec<RowOutcome>,
        model: &mut Option<String>,
    ) -> Result<()> {
        let embedder = factory.create(&point.embedder)?;
        *model = Some(embedder.model().to_string());
        let cache = SemanticCache::new(
            embedder,
            SemanticCacheConfig::new()
                .threshold(point.threshold)
                .metric(self.config.metric),
        )?;

        for row in dataset.rows() {
            let query = self.query_for(row);
            let start = Instant::now();
            let result = upstream.complete(&query).await;
            let latency = start.elapsed();
            let outcome = match result {
                Ok(response) => answered(row, Mode::Uncached, response, false, true, latency),
                Err(e) if e.is_fatal_to_configuration() => return Err(e),
                Err(e) => failed(row, Mode::Uncached, &e, true, latency),
            };
            outcomes.push(outcome);
        }

        for row in dataset.rows() {
            let query = self.query_for(row);
            let start = Instant::now();
            let result = cache.resolve(&query, upstream).await;
            let latency = start.elapsed();
            let outcome = match result {
                Ok(r) => answered(
                    row,
                    Mode::Cached,
                    r.response_text,
                    r.was_cache_hit,
                    !r.was_cache_hit,
                    latency,
                ),
                Err(e) if e.is_fatal_to_configuration() => return Err(e),
                Err(e) => {
                    let upstream_called = !e.is_embedding_failure()
                        && matches!(
                            e.kind(),
                            ErrorKind::TransientUpstream | ErrorKind::UpstreamUnavailable
                        );
                    failed(row, Mode::Cached, &e, upstream_called, latency)
                }
            };
            outcomes.push(outcome);
        }

        Ok(())
    }

    fn query_for(&self, row: &Row) -> CacheQuery {
        let query = CacheQuery::new(self.config.task.as_str(), row.question.as_str());
        match &self.config.system_prompt {
            Some(prompt) => query.with_system_prompt(prompt.as_str()),
            None => query,
        }
    }
}

/// Case-insensitive comparison with surrounding whitespace ignored.
pub fn matches_label(response: &str, label: &str) -> bool {
    response.trim().to_lowercase() == label.trim().to_lowercase()
}

fn answered(
    row: &Row,
    mode: Mode,
    response: String,
    cache_hit: bool,
    upstream_called: bool,
    latency: Duration,
) -> RowOutcome {
    let correct = matches_label(&response, &row.label);
    metrics::counter!(telemetry::HARNESS_ROWS_TOTAL,
        "mode" => mode.as_str(),
        "status" => if correct { "correct" } else { "incorrect" },
    )
    .increment(1);
    RowOutcome {
        row_id: row.id,
        mode,
        label: row.label.clone(),
        response: Some(response),
        correct,
        cache_hit,
        upstream_called,
        latency_seconds: latency.as_secs_f64(),
        error: None,
    }
}

fn failed(
    row: &Row,
    mode: Mode,
    error: &MimirError,
    upstream_called: bool,
    latency: Duration,
) -> RowOutcome {
    warn!(row = row.id, mode = mode.as_str(), error = %error, "row failed");
    metrics::counter!(telemetry::HARNESS_ROWS_TOTAL,
        "mode" => mode.as_str(),
        "status" => "failed",
    )
    .increment(1);
    RowOutcome {
        row_id: row.id,
        mode,
        label: row.label.clone(),
        response: None,
        correct: false,
        cache_hit: false,
        upstream_called,
        latency_seconds: latency.as_secs_f64(),
        error: Some(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_match_ignores_case_and_whitespace() {
        assert!(matches_label("  Physics\n", "physics"));
        assert!(matches_label("CS", "cs"));
        assert!(!matches_label("Physics.", "physics"));
    }

    #[test]
    fn points_are_embedders_by_thresholds() {
        let config = SweepConfig::new()
            .embedders(vec![EmbedderSpec::local(), EmbedderSpec::remote()])
            .thresholds(vec![0.1, 0.2]);
        let points = config.points();
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].embedder, EmbedderSpec::local());
        assert_eq!(points[1].threshold, 0.2);
        assert_eq!(points[2].embedder, EmbedderSpec::remote());
    }

    #[test]
    fn validate_rejects_empty_axes() {
        assert!(SweepConfig::new().thresholds(vec![]).validate().is_err());
        assert!(SweepConfig::new().embedders(vec![]).validate().is_err());
        assert!(SweepConfig::new().parallelism(0).validate().is_err());
        assert!(SweepConfig::new().thresholds(vec![1.5]).validate().is_err());
        assert!(SweepConfig::new().validate().is_ok());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
