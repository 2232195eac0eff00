//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.mimir/config.toml` (user)
//! 3. `/etc/mimir/config.toml` (system)
//! 4. built-in defaults
//!
//! API keys are never read from the file silently: each section may carry an
//! explicit `api_key`, otherwise the provider's environment variable is used
//! (see [`resolve_api_key`]).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{DEFAULT_THRESHOLD, DistanceMetric, SemanticCacheConfig};
use crate::harness::{DEFAULT_SWEEP_SYSTEM_PROMPT, DEFAULT_TASK, SweepConfig};
use crate::providers::openai::DEFAULT_CHAT_MODEL;
use crate::providers::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::providers::{Backoff, EmbedderSpec, EmbeddingProviderKind, RetryPolicy};
use crate::{MimirError, Result};

/// Environment variable holding the OpenAI key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable holding the HuggingFace key.
pub const HF_API_KEY_ENV: &str = "HF_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub upstream: UpstreamSection,
    #[serde(default)]
    pub sweep: SweepSection,
}

/// `[cache]`
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Similarity threshold (default: 0.2).
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// "cosine" or "euclidean" (default: cosine).
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Clear a persisted cache written under another configuration.
    #[serde(default)]
    pub rebuild_on_mismatch: bool,
    /// JSON snapshot for persistent caches.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    /// Bound for in-memory stores.
    #[serde(default)]
    pub max_entries: Option<u64>,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            metric: DistanceMetric::default(),
            rebuild_on_mismatch: false,
            store_path: None,
            max_entries: None,
        }
    }
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

impl CacheSection {
    pub fn to_cache_config(&self) -> SemanticCacheConfig {
        SemanticCacheConfig::new()
            .threshold(self.threshold)
            .metric(self.metric)
            .rebuild_on_mismatch(self.rebuild_on_mismatch)
    }
}

/// `[embedding]`
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSection {
    /// "local" or "remote" (default: remote).
    #[serde(default = "default_provider")]
    pub provider: EmbeddingProviderKind,
    #[serde(default)]
    pub model: Option<String>,
    /// Declared dimension of the remote model.
    #[serde(default)]
    pub dimensions: Option<usize>,
    /// HuggingFace API base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Explicit HuggingFace key; falls back to `HF_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dimensions: None,
            base_url: None,
            api_key: None,
        }
    }
}

fn default_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Remote
}

impl EmbeddingSection {
    pub fn to_spec(&self) -> EmbedderSpec {
        EmbedderSpec {
            provider: self.provider,
            model: self.model.clone(),
        }
    }
}

/// `[upstream]`
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSection {
    /// Chat model (default: gpt-3.5-turbo).
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    /// OpenAI-compatible base URL override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Explicit key; falls back to `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            temperature: 0.0,
            base_url: None,
            api_key: None,
            retry: RetrySection::default(),
        }
    }
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

/// `[upstream.retry]`
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Attempts including the first (default: 6).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts in seconds (default: 20).
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
    /// "fixed" or "exponential" (default: fixed).
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Cap for exponential backoff in seconds (default: 300).
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay_secs(),
            backoff: BackoffKind::default(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_delay_secs() -> f64 {
    DEFAULT_RETRY_DELAY.as_secs_f64()
}

fn default_max_delay_secs() -> f64 {
    300.0
}

/// Backoff shape as written in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

impl RetrySection {
    pub fn to_policy(&self) -> Result<RetryPolicy> {
        let delay = seconds("upstream.retry.delay_secs", self.delay_secs)?;
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                max_delay: seconds("upstream.retry.max_delay_secs", self.max_delay_secs)?,
            },
        };
        Ok(RetryPolicy::new()
            .max_attempts(self.max_attempts)
            .delay(delay)
            .backoff(backoff))
    }
}

/// `[sweep]`
#[derive(Debug, Clone, Deserialize)]
pub struct SweepSection {
    /// Embedders to compare (default: the `[embedding]` provider).
    #[serde(default)]
    pub embedders: Vec<EmbedderSpec>,
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<f32>,
    #[serde(default = "default_task")]
    pub task: String,
    #[serde(default = "default_sweep_system_prompt")]
    pub system_prompt: Option<String>,
    /// Rows read from the dataset (default: all).
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            embedders: Vec::new(),
            thresholds: default_thresholds(),
            task: default_task(),
            system_prompt: default_sweep_system_prompt(),
            limit: None,
            parallelism: default_parallelism(),
            timeout_secs: None,
        }
    }
}

fn default_thresholds() -> Vec<f32> {
    SweepConfig::default().thresholds
}

fn default_task() -> String {
    DEFAULT_TASK.to_string()
}

fn default_sweep_system_prompt() -> Option<String> {
    Some(DEFAULT_SWEEP_SYSTEM_PROMPT.to_string())
}

fn default_parallelism() -> usize {
    1
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the first existing standard
    /// file is used, else the defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MimirError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MimirError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MimirError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".mimir").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/mimir/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }

    /// Sweep settings, defaulting the embedder list to `[embedding]`.
    pub fn sweep_config(&self) -> SweepConfig {
        let embedders = if self.sweep.embedders.is_empty() {
            vec![self.embedding.to_spec()]
        } else {
            self.sweep.embedders.clone()
        };
        let mut config = SweepConfig::new()
            .embedders(embedders)
            .thresholds(self.sweep.thresholds.clone())
            .task(self.sweep.task.clone())
            .system_prompt(self.sweep.system_prompt.clone())
            .metric(self.cache.metric)
            .parallelism(self.sweep.parallelism);
        if let Some(secs) = self.sweep.timeout_secs {
            config = config.timeout(Duration::from_secs(secs));
        }
        config
    }
}

/// Pick the explicit key, else the named environment variable.
///
/// A missing or blank key is a `Configuration` error naming the variable.
pub fn resolve_api_key(explicit: Option<&str>, env_var: &str) -> Result<String> {
    let key = match explicit {
        Some(key) => Some(key.to_string()),
        None => std::env::var(env_var).ok(),
    };
    match key {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(MimirError::Configuration(format!(
            "no API key configured; set {env_var} or api_key in the config file"
        ))),
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| MimirError::Configuration(format!("invalid {field} = {value}: {e}")))
}
