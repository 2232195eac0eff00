//! Embedding vectors.

use serde::{Deserialize, Serialize};

/// An embedding vector produced by an [`Embedder`](crate::providers::Embedder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

impl Embedding {
    /// Wrap raw values, taking the dimension from their length.
    pub fn new(values: Vec<f32>, model: impl Into<String>) -> Self {
        Self {
            dimensions: values.len(),
            values,
            model: model.into(),
        }
    }
}
