//! Remote embeddings endpoint (fallback mode).
//!
//! Speaks `POST {endpoint}/api/embeddings {"model", "prompt"}` returning
//! `{"embedding": [..]}`, the same JSON contract the LLM endpoint exposes
//! for embeddings. One request per text; used only when the helper
//! subprocess is unavailable.

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

/// Embedder backed by the remote embeddings endpoint.
pub struct RemoteEmbedder {
    endpoint: String,
    model: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl RemoteEmbedder {
    /// Creates a remote embedder from the embedding configuration.
    #[must_use]
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.call_timeout())
            .connect_timeout(Duration::from_secs(3))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to build embeddings HTTP client");
                reqwest::blocking::Client::new()
            });
        Self {
            endpoint: config.fallback_endpoint.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            client,
        }
    }
}

impl Embedder for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingsRequest {
            model: &self.model,
            prompt: text,
        };
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.endpoint))
            .json(&request)
            .send()
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connect"
                } else {
                    "request"
                };
                tracing::warn!(error = %e, error_kind = kind, "embeddings fallback request failed");
                Error::EmbeddingUnavailable(format!("fallback {kind} error: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::EmbeddingUnavailable(format!(
                "fallback endpoint returned status {status}"
            )));
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .map_err(|e| Error::EmbeddingUnavailable(format!("fallback response parse: {e}")))?;
        if parsed.embedding.len() != self.dimensions {
            return Err(Error::EmbeddingUnavailable(format!(
                "fallback returned dimension {} (expected {})",
                parsed.embedding.len(),
                self.dimensions
            )));
        }
        Ok(parsed.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DoctrineConfig;

    #[test]
    fn test_unreachable_endpoint_is_embedding_unavailable() {
        let mut config = DoctrineConfig::default().embedding;
        // A port nothing listens on.
        config.fallback_endpoint = "http://127.0.0.1:1".to_string();
        config.call_timeout_secs = 1;
        let embedder = RemoteEmbedder::from_config(&config);
        let err = embedder.embed("hello").unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
    }
}
