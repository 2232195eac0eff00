//! Local embeddings via fastembed-rs.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::traits::{Embedder, ensure_dimensions, ensure_embeddable};
use crate::error::{MimirError, Result};
use crate::types::Embedding;

/// Supported local embedding models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalEmbeddingModel {
    /// all-MiniLM-L6-v2 (384 dims, fast, good quality).
    AllMiniLmL6V2,
    /// all-MiniLM-L12-v2 (384 dims, slightly better).
    AllMiniLmL12V2,
    /// BGE-small-en (384 dims, strong retrieval).
    BgeSmallEn,
    /// BGE-base-en (768 dims, higher quality).
    BgeBaseEn,
}

impl LocalEmbeddingModel {
    /// Get the model name for display.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::AllMiniLmL12V2 => "all-MiniLM-L12-v2",
            Self::BgeSmallEn => "BGE-small-en",
            Self::BgeBaseEn => "BGE-base-en",
        }
    }

    /// Get the embedding dimensions.
    pub fn dimensions(&self) -> usize {
        match self {
            Self::AllMiniLmL6V2 | Self::AllMiniLmL12V2 | Self::BgeSmallEn => 384,
            Self::BgeBaseEn => 768,
        }
    }

    /// Parse a configured model name (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
                Ok(Self::AllMiniLmL6V2)
            }
            "all-minilm-l12-v2" | "sentence-transformers/all-minilm-l12-v2" => {
                Ok(Self::AllMiniLmL12V2)
            }
            "bge-small-en" | "baai/bge-small-en-v1.5" => Ok(Self::BgeSmallEn),
            "bge-base-en" | "baai/bge-base-en-v1.5" => Ok(Self::BgeBaseEn),
            _ => Err(MimirError::UnsupportedModel(name.to_string())),
        }
    }
}

impl From<LocalEmbeddingModel> for fastembed::EmbeddingModel {
    fn from(model: LocalEmbeddingModel) -> Self {
        match model {
            LocalEmbeddingModel::AllMiniLmL6V2 => fastembed::EmbeddingModel::AllMiniLML6V2,
            LocalEmbeddingModel::AllMiniLmL12V2 => fastembed::EmbeddingModel::AllMiniLML12V2,
            LocalEmbeddingModel::BgeSmallEn => fastembed::EmbeddingModel::BGESmallENV15,
            LocalEmbeddingModel::BgeBaseEn => fastembed::EmbeddingModel::BGEBaseENV15,
        }
    }
}

/// Directory for downloaded model files: `$MIMIR_CACHE_DIR`, else the
/// platform cache dir.
pub fn model_cache_dir() -> PathBuf {
    std::env::var("MIMIR_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("mimir")
                .join("models")
        })
}

/// Local embedding provider using fastembed-rs.
///
/// Inference runs on the blocking thread pool; the model handle is behind a
/// mutex because fastembed needs `&mut` access.
pub struct LocalEmbeddingProvider {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    kind: LocalEmbeddingModel,
}

impl LocalEmbeddingProvider {
    /// Create a new provider with the specified model.
    ///
    /// Downloads the model if not cached locally.
    pub fn new(kind: LocalEmbeddingModel) -> Result<Self> {
        let options = fastembed::InitOptions::new(kind.into())
            .with_show_download_progress(true)
            .with_cache_dir(model_cache_dir());

        let model = fastembed::TextEmbedding::try_new(options).map_err(|e| {
            MimirError::Configuration(format!("Failed to load embedding model: {}", e))
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            kind,
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbeddingProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        self.kind.name()
    }

    fn dimensions(&self) -> usize {
        self.kind.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        ensure_embeddable(text)?;
        let model = Arc::clone(&self.model);
        let input = text.to_string();

        let vectors = tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| MimirError::Store("embedding model lock poisoned".to_string()))?;
            guard
                .embed(vec![input], None)
                .map_err(|e| MimirError::Store(format!("Embedding failed: {}", e)))
        })
        .await
        .map_err(|e| MimirError::Store(format!("embedding task failed: {e}")))??;

        let values = vectors.into_iter().next().ok_or(MimirError::EmptyResponse)?;
        let embedding = Embedding::new(values, self.kind.name());
        ensure_dimensions(&embedding, self.kind.dimensions())?;
        Ok(embedding)
    }
}
