//! The embedding pipeline: cache → subprocess primary → remote fallback.

use super::{Embedder, EmbeddingCache, RemoteEmbedder, SubprocessEmbedder, normalize};
use crate::config::EmbeddingConfig;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Batch-encodes text to fixed-dimension normalized vectors.
///
/// Lookup order per text: cache, helper subprocess (when configured),
/// remote fallback. Falling back is a per-call decision: the subprocess
/// tracks its own health and respawns a failed helper lazily, so a
/// transient failure never disables the primary path for good. Fails
/// with [`Error::EmbeddingUnavailable`] only when every mode is
/// exhausted.
pub struct EmbeddingPipeline {
    subprocess: Option<Arc<SubprocessEmbedder>>,
    fallback: Box<dyn Embedder>,
    cache: EmbeddingCache,
    batch_size: usize,
    dimensions: usize,
}

impl EmbeddingPipeline {
    /// Builds the pipeline from configuration: subprocess primary when a
    /// helper command is configured, remote fallback always.
    #[must_use]
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let subprocess = SubprocessEmbedder::from_config(config).map(Arc::new);
        Self::with_backends(
            subprocess,
            Box::new(RemoteEmbedder::from_config(config)),
            config,
        )
    }

    /// Builds the pipeline over explicit backends (tests inject
    /// deterministic embedders here).
    #[must_use]
    pub fn with_backends(
        subprocess: Option<Arc<SubprocessEmbedder>>,
        fallback: Box<dyn Embedder>,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            subprocess,
            fallback,
            cache: EmbeddingCache::new(config.model.clone(), config.cache_capacity),
            batch_size: config.batch_size.max(1),
            dimensions: config.dimensions,
        }
    }

    /// The process-wide vector dimension D.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Encodes one text.
    pub fn encode_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.encode(std::slice::from_ref(&text.to_string()))?;
        batch
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("empty encode result".to_string()))
    }

    /// Encodes a list of texts, one normalized vector per text, in order.
    pub fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut missing: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if let Some(hit) = self.cache.get(text) {
                results[i] = Some(hit);
            } else {
                missing.push(i);
            }
        }
        if !missing.is_empty() {
            metrics::counter!("doctrine_embed_cache_misses_total")
                .increment(missing.len() as u64);
        }

        for chunk in missing.chunks(self.batch_size) {
            let chunk_texts: Vec<&str> = chunk.iter().map(|&i| texts[i].as_str()).collect();
            let encoded = self.encode_chunk(&chunk_texts)?;
            for (&i, mut vector) in chunk.iter().zip(encoded) {
                normalize(&mut vector);
                self.cache.put(&texts[i], vector.clone());
                results[i] = Some(vector);
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| Error::EmbeddingUnavailable("encode gap".to_string())))
            .collect()
    }

    fn encode_chunk(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if let Some(subprocess) = &self.subprocess {
            match subprocess.embed_batch(texts) {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    // The subprocess resets its own state on failure and
                    // respawns lazily; the next chunk tries it again.
                    tracing::warn!(error = %e, "primary embedder failed, using fallback for this batch");
                },
            }
        }
        self.fallback.embed_batch(texts)
    }

    /// Shuts down the helper subprocess, bounded by `wait`.
    pub fn shutdown(&self, wait: Duration) {
        if let Some(subprocess) = &self.subprocess {
            subprocess.shutdown(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DoctrineConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder counting its calls.
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let len = u32::try_from(text.len()).unwrap_or(u32::MAX);
            #[allow(clippy::cast_precision_loss)]
            let first = len as f32;
            Ok(vec![first, 1.0])
        }
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        fn embed(&self, _text: &str) -> crate::Result<Vec<f32>> {
            Err(Error::EmbeddingUnavailable("down".to_string()))
        }
    }

    fn test_config() -> crate::config::EmbeddingConfig {
        let mut config = DoctrineConfig::default().embedding;
        config.dimensions = 2;
        config.batch_size = 2;
        config
    }

    #[test]
    fn test_cache_prevents_rework() {
        let config = test_config();
        let pipeline = EmbeddingPipeline::with_backends(
            None,
            Box::new(CountingEmbedder {
                calls: AtomicUsize::new(0),
            }),
            &config,
        );

        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let first = pipeline.encode(&texts).unwrap();
        let second = pipeline.encode(&texts).unwrap();
        assert_eq!(first, second);
        // Vectors are normalized.
        for v in &first {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_both_modes_exhausted() {
        let config = test_config();
        let pipeline =
            EmbeddingPipeline::with_backends(None, Box::new(FailingEmbedder), &config);
        let err = pipeline.encode(&["x".to_string()]).unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }

    #[test]
    fn test_empty_input() {
        let config = test_config();
        let pipeline =
            EmbeddingPipeline::with_backends(None, Box::new(FailingEmbedder), &config);
        assert!(pipeline.encode(&[]).unwrap().is_empty());
    }
}
