//! Embedder selection.
//!
//! The provider is picked once, when a cache is built, from the closed set
//! [`EmbeddingProviderKind`]. [`EmbedderFactory`] is the seam the sweep
//! harness uses to get a fresh embedder per configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;
use super::traits::Embedder;
use crate::{MimirError, Result};

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// On-device transformer (fastembed).
    Local,
    /// HuggingFace Inference API.
    Remote,
}

impl EmbeddingProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One embedding configuration of a sweep.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbedderSpec {
    pub provider: EmbeddingProviderKind,
    /// Model name; `None` selects the provider's default.
    #[serde(default)]
    pub model: Option<String>,
}

impl EmbedderSpec {
    pub fn local() -> Self {
        Self {
            provider: EmbeddingProviderKind::Local,
            model: None,
        }
    }

    pub fn remote() -> Self {
        Self {
            provider: EmbeddingProviderKind::Remote,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

impl fmt::Display for EmbedderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{}:{}", self.provider, model),
            None => write!(f, "{}", self.provider),
        }
    }
}

/// Builds embedders for sweep configurations.
///
/// Closures of the right shape implement this trait, which is how tests
/// inject deterministic embedders.
pub trait EmbedderFactory: Send + Sync {
    fn create(&self, spec: &EmbedderSpec) -> Result<Arc<dyn Embedder>>;
}

impl<F> EmbedderFactory for F
where
    F: Fn(&EmbedderSpec) -> Result<Arc<dyn Embedder>> + Send + Sync,
{
    fn create(&self, spec: &EmbedderSpec) -> Result<Arc<dyn Embedder>> {
        self(spec)
    }
}

/// Factory for the shipped providers.
#[derive(Debug, Clone, Default)]
pub struct DefaultEmbedderFactory {
    /// HuggingFace key; required only for remote specs.
    pub huggingface_api_key: Option<String>,
    /// Declared dimension for remote models.
    pub remote_dimensions: Option<usize>,
    /// Override the HuggingFace base URL.
    pub remote_base_url: Option<String>,
    /// Retry applied to remote embedding calls. Default: [`RetryPolicy::default`].
    pub retry: RetryPolicy,
}

impl DefaultEmbedderFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn huggingface_api_key(mut self, key: impl Into<String>) -> Self {
        self.huggingface_api_key = Some(key.into());
        self
    }

    pub fn remote_dimensions(mut self, dimensions: usize) -> Self {
        self.remote_dimensions = Some(dimensions);
        self
    }

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.remote_base_url = Some(url.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    #[cfg(feature = "local-inference")]
    fn local(&self, spec: &EmbedderSpec) -> Result<Arc<dyn Embedder>> {
        use super::fastembed::{LocalEmbeddingModel, LocalEmbeddingProvider};

        let kind = match spec.model.as_deref() {
            Some(name) => LocalEmbeddingModel::from_name(name)?,
            None => LocalEmbeddingModel::AllMiniLmL6V2,
        };
        Ok(Arc::new(LocalEmbeddingProvider::new(kind)?))
    }

    #[cfg(not(feature = "local-inference"))]
    fn local(&self, _spec: &EmbedderSpec) -> Result<Arc<dyn Embedder>> {
        Err(MimirError::Configuration(
            "local embeddings require the `local-inference` feature".to_string(),
        ))
    }

    #[cfg(feature = "huggingface")]
    fn remote(&self, spec: &EmbedderSpec) -> Result<Arc<dyn Embedder>> {
        use super::huggingface::{
            DEFAULT_REMOTE_DIMENSIONS, DEFAULT_REMOTE_MODEL, RemoteEmbeddingProvider,
        };
        use super::retry::RetryingEmbedder;

        let key = self.huggingface_api_key.as_deref().ok_or_else(|| {
            MimirError::Configuration(
                "remote embeddings need a HuggingFace API key (HF_API_KEY)".to_string(),
            )
        })?;
        let model = spec.model.as_deref().unwrap_or(DEFAULT_REMOTE_MODEL);
        let dimensions = self.remote_dimensions.unwrap_or(DEFAULT_REMOTE_DIMENSIONS);
        let provider = match &self.remote_base_url {
            Some(url) => RemoteEmbeddingProvider::with_base_url(key, model, dimensions, url)?,
            None => RemoteEmbeddingProvider::new(key, model, dimensions)?,
        };
        Ok(Arc::new(RetryingEmbedder::new(
            Arc::new(provider),
            self.retry.clone(),
        )?))
    }

    #[cfg(not(feature = "huggingface"))]
    fn remote(&self, _spec: &EmbedderSpec) -> Result<Arc<dyn Embedder>> {
        Err(MimirError::Configuration(
            "remote embeddings require the `huggingface` feature".to_string(),
        ))
    }
}

impl EmbedderFactory for DefaultEmbedderFactory {
    fn create(&self, spec: &EmbedderSpec) -> Result<Arc<dyn Embedder>> {
        match spec.provider {
            EmbeddingProviderKind::Local => self.local(spec),
            EmbeddingProviderKind::Remote => self.remote(spec),
        }
    }
}
