//! Approximate nearest neighbour search for the in-process search source

pub mod index;

pub use index::{cosine_similarity, CosineDistance, VectorError, VectorIndex, VectorResult};
