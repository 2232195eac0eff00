//! HuggingFace Inference API client for remote embeddings.
//!
//! Uses the serverless feature-extraction pipeline.
//! See: <https://huggingface.co/docs/api-inference/index>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::traits::{Embedder, ensure_dimensions, ensure_embeddable};
use crate::{Embedding, MimirError, Result};

/// Default base URL for HuggingFace Inference API
const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Default remote model and its output dimension.
pub const DEFAULT_REMOTE_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_REMOTE_DIMENSIONS: usize = 384;

/// Remote embedder backed by the HuggingFace Inference API.
///
/// The API does not advertise a model's dimension, so it is declared up
/// front and every response is checked against it.
#[derive(Clone)]
pub struct RemoteEmbeddingProvider {
    api_key: String,
    http: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl RemoteEmbeddingProvider {
    /// Create a provider for `model` producing `dimensions`-long vectors.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self> {
        Self::with_base_url(api_key, model, dimensions, DEFAULT_BASE_URL)
    }

    /// Create a provider with a custom base URL (for testing with wiremock).
    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MimirError::Configuration(
                "HuggingFace API key is empty".to_string(),
            ));
        }
        if dimensions == 0 {
            return Err(MimirError::Configuration(
                "embedding dimension must be positive".to_string(),
            ));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MimirError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            http,
            base_url: base_url.into(),
            model: model.into(),
            dimensions,
        })
    }

    fn handle_response_errors(&self, response: &reqwest::Response) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 | 403 => Err(MimirError::AuthenticationFailed),
            404 => Err(MimirError::UnsupportedModel(self.model.clone())),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(MimirError::RateLimited { retry_after })
            }
            503 => Err(MimirError::Api {
                status: 503,
                message: "Model is loading, please retry".to_string(),
            }),
            code => Err(MimirError::Api {
                status: code,
                message: format!("HuggingFace API error: {}", status),
            }),
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a str,
}

#[async_trait]
impl Embedder for RemoteEmbeddingProvider {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        ensure_embeddable(text)?;
        let url = format!("{}/pipeline/feature-extraction/{}", self.base_url, self.model);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbedRequest { inputs: text })
            .send()
            .await?;

        self.handle_response_errors(&response)?;

        // Sentence-transformer models return a pooled [f32; dim]; some
        // deployments wrap it as [[f32; dim]].
        let body: serde_json::Value = response.json().await?;
        let values = parse_feature_vector(body)?;

        let embedding = Embedding::new(values, self.model.clone());
        ensure_dimensions(&embedding, self.dimensions)?;
        Ok(embedding)
    }
}

fn parse_feature_vector(body: serde_json::Value) -> Result<Vec<f32>> {
    if let Ok(flat) = serde_json::from_value::<Vec<f32>>(body.clone()) {
        return if flat.is_empty() {
            Err(MimirError::EmptyResponse)
        } else {
            Ok(flat)
        };
    }
    let nested: Vec<Vec<f32>> = serde_json::from_value(body)?;
    nested
        .into_iter()
        .next()
        .filter(|v| !v.is_empty())
        .ok_or(MimirError::EmptyResponse)
}
