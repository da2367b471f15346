//! Embedding generation.
//!
//! The pipeline encodes text into fixed-dimension vectors through a
//! long-lived helper subprocess ([`SubprocessEmbedder`]), falling back to a
//! remote embeddings endpoint ([`RemoteEmbedder`]) when the helper is
//! unavailable, with a content-addressed cache in front of both.
//!
//! Vectors leaving the pipeline are always L2-normalized, so cosine
//! similarity downstream is a plain dot product.

mod cache;
mod pipeline;
mod remote;
mod subprocess;

pub use cache::EmbeddingCache;
pub use pipeline::EmbeddingPipeline;
pub use remote::RemoteEmbedder;
pub use subprocess::SubprocessEmbedder;

use crate::Result;

/// Trait for embedding generators.
///
/// Deterministic for the same model and input.
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Normalizes a vector to unit L2 length in place. Zero vectors are left
/// unchanged.
pub fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

/// Dot product; cosine similarity for normalized vectors.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
