//! Dense-vector semantic scorer.
//!
//! Record embeddings and the query embedding are unit vectors, so cosine
//! similarity is a single dot product per record. Negative similarities
//! carry no ranking signal here and clamp to zero, putting the scorer on
//! the same `[0, 1]` scale as the other two.

use crate::index::EmbeddingMatrix;

/// Score every record as `clamp(query · record, 0, 1)`.
///
/// A query vector of the wrong dimensionality (or all zeros, the degraded
/// fallback when the backend is down) yields an all-zero score vector.
pub fn score(embeddings: &EmbeddingMatrix, query_vector: &[f32]) -> Vec<f64> {
    if query_vector.len() != embeddings.dim() {
        return vec![0.0; embeddings.rows()];
    }

    (0..embeddings.rows())
        .map(|row| {
            let dot: f32 = embeddings
                .row(row)
                .iter()
                .zip(query_vector)
                .map(|(a, b)| a * b)
                .sum();
            dot.clamp(0.0, 1.0) as f64
        })
        .collect()
}
