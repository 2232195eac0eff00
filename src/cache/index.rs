//! Nearest-neighbour index over cache entry embeddings.
//!
//! [`FlatIndex`] is an exact linear scan, which is plenty for the tens to
//! low thousands of entries a cache holds per run. The [`VectorIndex`]
//! trait leaves room for an approximate index later.

use serde::{Deserialize, Serialize};

use crate::{MimirError, Result};

/// Distance between two embeddings. Smaller is closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in `[0, 2]`.
    #[default]
    Cosine,
    /// L2 distance.
    Euclidean,
}

impl DistanceMetric {
    /// Distance between two equal-length vectors.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => 1.0 - cosine_similarity(a, b),
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        }
    }
}

/// Cosine similarity; a zero vector is similar to nothing.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// A search result: payload key and its distance from the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub key: String,
    pub distance: f32,
}

/// Vector index keyed by cache entry key.
pub trait VectorIndex: Send + Sync {
    /// Dimension every stored and queried vector must have.
    fn dimensions(&self) -> usize;

    fn metric(&self) -> DistanceMetric;

    /// Add a point. Fails only on dimension mismatch.
    fn insert(&mut self, vector: Vec<f32>, key: String) -> Result<()>;

    /// The `k` closest points, ascending by distance; ties keep insertion
    /// order. Empty when the index is empty.
    fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Drop the point stored under `key`. Returns whether it existed.
    fn remove(&mut self, key: &str) -> bool;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact brute-force index.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    metric: DistanceMetric,
    // Insertion order is the tie-break order.
    points: Vec<(String, Vec<f32>)>,
}

impl FlatIndex {
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            dimensions,
            metric,
            points: Vec::new(),
        }
    }

    fn check_dimensions(&self, actual: usize) -> Result<()> {
        if actual != self.dimensions {
            return Err(MimirError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn insert(&mut self, vector: Vec<f32>, key: String) -> Result<()> {
        self.check_dimensions(vector.len())?;
        self.points.push((key, vector));
        Ok(())
    }

    fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimensions(vector.len())?;

        let mut results: Vec<Neighbor> = self
            .points
            .iter()
            .map(|(key, point)| Neighbor {
                key: key.clone(),
                distance: self.metric.distance(vector, point),
            })
            .collect();

        // Stable sort: equal distances stay in insertion order.
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(k);
        Ok(results)
    }

    fn remove(&mut self, key: &str) -> bool {
        let before = self.points.len();
        self.points.retain(|(k, _)| k != key);
        self.points.len() != before
    }

    fn clear(&mut self) {
        self.points.clear();
    }

    fn len(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(points: &[(&str, [f32; 3])], metric: DistanceMetric) -> FlatIndex {
        let mut index = FlatIndex::new(3, metric);
        for (key, vector) in points {
            index.insert(vector.to_vec(), key.to_string()).unwrap();
        }
        index
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = FlatIndex::new(3, DistanceMetric::Cosine);
        assert!(index.nearest(&[1.0, 0.0, 0.0], 1).unwrap().is_empty());
    }

    #[test]
    fn nearest_orders_by_distance() {
        let index = index_with(
            &[
                ("x", [1.0, 0.0, 0.0]),
                ("y", [0.0, 1.0, 0.0]),
                ("xy", [1.0, 1.0, 0.0]),
            ],
            DistanceMetric::Cosine,
        );

        let results = index.nearest(&[1.0, 0.1, 0.0], 3).unwrap();
        let keys: Vec<&str> = results.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["x", "xy", "y"]);
        assert!(results[0].distance < results[1].distance);
    }

    #[test]
    fn ties_prefer_earlier_insertion() {
        let index = index_with(
            &[("first", [0.0, 2.0, 0.0]), ("second", [0.0, 5.0, 0.0])],
            DistanceMetric::Cosine,
        );

        // Same direction, so both have cosine distance 0.
        let results = index.nearest(&[0.0, 1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].key, "first");
        assert_eq!(results[1].key, "second");
    }

    #[test]
    fn euclidean_distance() {
        let index = index_with(&[("origin", [0.0, 0.0, 0.0])], DistanceMetric::Euclidean);
        let results = index.nearest(&[3.0, 4.0, 0.0], 1).unwrap();
        assert!((results[0].distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn k_truncates() {
        let index = index_with(
            &[("a", [1.0, 0.0, 0.0]), ("b", [0.0, 1.0, 0.0])],
            DistanceMetric::Cosine,
        );
        assert_eq!(index.nearest(&[1.0, 0.0, 0.0], 1).unwrap().len(), 1);
        assert!(index.nearest(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn dimension_mismatch_on_insert_and_query() {
        let mut index = FlatIndex::new(3, DistanceMetric::Cosine);
        assert!(matches!(
            index.insert(vec![1.0, 0.0], "short".into()),
            Err(MimirError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(index.nearest(&[1.0; 4], 1).is_err());
    }

    #[test]
    fn remove_and_clear() {
        let mut index = index_with(
            &[("a", [1.0, 0.0, 0.0]), ("b", [0.0, 1.0, 0.0])],
            DistanceMetric::Cosine,
        );
        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert_eq!(index.len(), 1);
        index.clear();
        assert!(index.is_empty());
    }

    #[test]
    fn zero_vector_has_unit_cosine_distance() {
        let distance = DistanceMetric::Cosine.distance(&[0.0, 0.0], &[1.0, 0.0]);
        assert!((distance - 1.0).abs() < 1e-6);
    }
}
