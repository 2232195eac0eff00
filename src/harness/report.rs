//! Sweep results.
//!
//! Each configuration gets a [`ConfigurationReport`] summarising both passes;
//! per-row [`RowOutcome`]s are kept alongside so a report can be audited row
//! by row. Everything serialises to JSON; [`SweepReport::render_table`]
//! gives the console view.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::providers::EmbeddingProviderKind;

/// Which pass a row outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every row through the semantic cache.
    Cached,
    /// Every row straight to upstream.
    Uncached,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Uncached => "uncached",
        }
    }
}

/// What happened to one dataset row in one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub row_id: usize,
    pub mode: Mode,
    pub label: String,
    /// `None` when the row failed.
    pub response: Option<String>,
    pub correct: bool,
    pub cache_hit: bool,
    pub upstream_called: bool,
    /// Time to answer, or time to failure.
    pub latency_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RowOutcome {
    pub fn is_failed(&self) -> bool {
        self.response.is_none()
    }
}

/// Whether a configuration ran to the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ConfigurationStatus {
    Completed,
    Aborted { reason: String },
}

/// Summary of one (embedding provider, threshold) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationReport {
    pub embedding_provider: EmbeddingProviderKind,
    pub embedding_model: Option<String>,
    pub threshold: f32,
    pub accuracy_cached: f64,
    pub accuracy_uncached: f64,
    /// Total over all rows of the pass.
    pub latency_cached_seconds: f64,
    pub latency_uncached_seconds: f64,
    pub mean_latency_cached_seconds: f64,
    pub mean_latency_uncached_seconds: f64,
    pub rows: usize,
    pub cache_hits: usize,
    pub upstream_calls_cached: usize,
    pub upstream_calls_uncached: usize,
    pub failed_rows_cached: usize,
    pub failed_rows_uncached: usize,
    pub status: ConfigurationStatus,
    #[serde(default)]
    pub outcomes: Vec<RowOutcome>,
}

/// Per-pass aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct PassSummary {
    pub accuracy: f64,
    pub total_latency: f64,
    pub mean_latency: f64,
    pub hits: usize,
    pub upstream_calls: usize,
    pub failed: usize,
}

impl PassSummary {
    /// Accuracy counts answered rows only; failed rows are reported apart.
    pub(crate) fn of<'a>(outcomes: impl Iterator<Item = &'a RowOutcome>) -> Self {
        let mut summary = Self::default();
        let mut rows = 0usize;
        let mut answered = 0usize;
        let mut correct = 0usize;
        for outcome in outcomes {
            rows += 1;
            summary.total_latency += outcome.latency_seconds;
            if outcome.cache_hit {
                summary.hits += 1;
            }
            if outcome.upstream_called {
                summary.upstream_calls += 1;
            }
            if outcome.is_failed() {
                summary.failed += 1;
            } else {
                answered += 1;
                if outcome.correct {
                    correct += 1;
                }
            }
        }
        if answered > 0 {
            summary.accuracy = correct as f64 / answered as f64;
        }
        if rows > 0 {
            summary.mean_latency = summary.total_latency / rows as f64;
        }
        summary
    }
}

impl ConfigurationReport {
    pub(crate) fn build(
        embedding_provider: EmbeddingProviderKind,
        embedding_model: Option<String>,
        threshold: f32,
        rows: usize,
        outcomes: Vec<RowOutcome>,
        status: ConfigurationStatus,
    ) -> Self {
        let cached = PassSummary::of(outcomes.iter().filter(|o| o.mode == Mode::Cached));
        let uncached = PassSummary::of(outcomes.iter().filter(|o| o.mode == Mode::Uncached));
        Self {
            embedding_provider,
            embedding_model,
            threshold,
            accuracy_cached: cached.accuracy,
            accuracy_uncached: uncached.accuracy,
            latency_cached_seconds: cached.total_latency,
            latency_uncached_seconds: uncached.total_latency,
            mean_latency_cached_seconds: cached.mean_latency,
            mean_latency_uncached_seconds: uncached.mean_latency,
            rows,
            cache_hits: cached.hits,
            upstream_calls_cached: cached.upstream_calls,
            upstream_calls_uncached: uncached.upstream_calls,
            failed_rows_cached: cached.failed,
            failed_rows_uncached: uncached.failed,
            status,
            outcomes,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ConfigurationStatus::Completed
    }

    /// Outcomes of one pass, in row order.
    pub fn outcomes_for(&self, mode: Mode) -> impl Iterator<Item = &RowOutcome> {
        self.outcomes.iter().filter(move |o| o.mode == mode)
    }
}

/// Result of a whole sweep, in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub configurations: Vec<ConfigurationReport>,
    /// Stopped early by a cancel request.
    #[serde(default)]
    pub cancelled: bool,
    /// Stopped early by the sweep timeout.
    #[serde(default)]
    pub timed_out: bool,
}

impl SweepReport {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    /// Fixed-width summary table, one line per configuration.
    pub fn render_table(&self) -> String {
        let mut out = format!(
            "{:<8} {:<40} {:>9} {:>10} {:>10} {:>10} {:>10} {:>6} {:>6}  {}\n",
            "provider",
            "model",
            "threshold",
            "acc cache",
            "acc none",
            "lat cache",
            "lat none",
            "hits",
            "rows",
            "status"
        );
        for c in &self.configurations {
            let status = match &c.status {
                ConfigurationStatus::Completed => "completed".to_string(),
                ConfigurationStatus::Aborted { reason } => format!("aborted: {reason}"),
            };
            out.push_str(&format!(
                "{:<8} {:<40} {:>9.3} {:>10.3} {:>10.3} {:>9.2}s {:>9.2}s {:>6} {:>6}  {}\n",
                c.embedding_provider.as_str(),
                c.embedding_model.as_deref().unwrap_or("-"),
                c.threshold,
                c.accuracy_cached,
                c.accuracy_uncached,
                c.latency_cached_seconds,
                c.latency_uncached_seconds,
                c.cache_hits,
                c.rows,
                status
            ));
        }
        if self.cancelled {
            out.push_str("sweep cancelled before all configurations ran\n");
        }
        if self.timed_out {
            out.push_str("sweep timed out before all configurations ran\n");
        }
        out
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_table())
    }
}
