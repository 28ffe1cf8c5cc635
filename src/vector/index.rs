//! Vector index implementation using HNSW
//!
//! Thin wrapper around hnsw_rs keyed by the caller's slot number.

use hnsw_rs::prelude::*;
use thiserror::Error;

/// Vector index errors
#[derive(Error, Debug)]
pub enum VectorError {
    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type VectorResult<T> = Result<T, VectorError>;

/// Cosine similarity of two vectors; 0.0 when either has zero norm
pub fn cosine_similarity(va: &[f32], vb: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (a, b) in va.iter().zip(vb.iter()) {
        dot += a * b;
        norm_a += a * a;
        norm_b += b * b;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Cosine distance implementation for hnsw_rs
#[derive(Clone, Copy, Debug, Default)]
pub struct CosineDistance;

impl Distance<f32> for CosineDistance {
    fn eval(&self, va: &[f32], vb: &[f32]) -> f32 {
        1.0 - cosine_similarity(va, vb)
    }
}

/// Wrapper around HNSW index
pub struct VectorIndex {
    dimensions: usize,
    len: usize,
    hnsw: Hnsw<'static, f32, CosineDistance>,
}

// Hnsw doesn't implement Debug
impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimensions", &self.dimensions)
            .field("len", &self.len)
            .finish()
    }
}

impl VectorIndex {
    /// Create an index sized for roughly `capacity` vectors
    pub fn new(dimensions: usize, capacity: usize) -> Self {
        let max_elements = capacity.max(1_000);
        let m = 16;
        let ef_construction = 200;

        let hnsw = Hnsw::new(m, max_elements, 16, ef_construction, CosineDistance);

        Self {
            dimensions,
            len: 0,
            hnsw,
        }
    }

    /// Add a vector under slot `id`
    pub fn add(&mut self, id: usize, vector: &Vec<f32>) -> VectorResult<()> {
        self.check_dimensions(vector.len())?;
        self.hnsw.insert((vector, id));
        self.len += 1;
        Ok(())
    }

    /// Nearest `k` slots with their cosine distance, closest first
    pub fn search(&self, query: &[f32], k: usize) -> VectorResult<Vec<(usize, f32)>> {
        self.check_dimensions(query.len())?;
        if self.len == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let ef_search = (k * 2).max(32);
        let results = self.hnsw.search(query, k, ef_search);

        Ok(results.into_iter().map(|n| (n.d_id, n.distance)).collect())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_dimensions(&self, got: usize) -> VectorResult<()> {
        if got != self.dimensions {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimensions,
                got,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_index_basic() {
        let mut index = VectorIndex::new(3, 16);

        index.add(0, &vec![1.0, 0.0, 0.0]).unwrap();
        index.add(1, &vec![0.0, 1.0, 0.0]).unwrap();
        index.add(2, &vec![0.0, 0.1, 0.9]).unwrap();

        let results = index.search(&[1.0, 0.1, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0);
        assert!(results[0].1 < results[1].1);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = VectorIndex::new(3, 16);
        assert!(matches!(
            index.add(0, &vec![1.0, 0.0]),
            Err(VectorError::DimensionMismatch { expected: 3, got: 2 })
        ));
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = VectorIndex::new(2, 16);
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_cosine_distance() {
        let v1 = vec![1.0, 0.0];
        let v2 = vec![0.0, 1.0];

        let cosine = CosineDistance;
        assert!((cosine.eval(&v1, &v2) - 1.0).abs() < 1e-6);
        assert!(cosine.eval(&v1, &v1).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &v1), 0.0);
    }
}
