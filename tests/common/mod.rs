//! Shared test fixtures: a deterministic bag-of-words embedder and a
//! scripted LLM provider, wired into an in-memory service container.

// Each integration test crate compiles this module independently and
// uses a different subset of it.
#![allow(dead_code)]

use doctrine::config::DoctrineConfig;
use doctrine::embedding::{Embedder, EmbeddingPipeline};
use doctrine::graph::{EntityResolver, SqliteGraphStore};
use doctrine::llm::{GenerateOptions, LlmPipeline, LlmProvider};
use doctrine::services::ServiceContainer;
use doctrine::storage::DocumentStore;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const DIMENSIONS: usize = 64;

/// Deterministic bag-of-words embedder: token-hashed buckets, so texts
/// sharing words get high cosine similarity. Normalization happens in
/// the pipeline.
pub struct KeywordEmbedder;

impl Embedder for KeywordEmbedder {
    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn embed(&self, text: &str) -> doctrine::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIMENSIONS];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % DIMENSIONS;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }
}

/// Scripted LLM: answers claim-extraction prompts from the section text
/// it sees and synthesis prompts with a fixed cited sentence.
pub struct ScriptedLlm;

impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn generate(&self, prompt: &str, _options: &GenerateOptions) -> doctrine::Result<String> {
        if prompt.contains("Extract the atomic factual claims") {
            if prompt.contains("expire after 1 hour") {
                return Ok(r#"{"claims": [{"subject": "Access tokens", "predicate": "expire after", "object": "1 hour", "qualifier": null, "confidence": 0.9}]}"#.to_string());
            }
            if prompt.contains("expire after 2 hours") {
                return Ok(r#"{"claims": [{"subject": "Access tokens", "predicate": "expire after", "object": "2 hours", "qualifier": null, "confidence": 0.9}]}"#.to_string());
            }
            return Ok(r#"{"claims": []}"#.to_string());
        }
        if prompt.contains("Is the claim supported") {
            return Ok("yes".to_string());
        }
        Ok("Access tokens last one hour according to the spec [source].".to_string())
    }
}

/// An LLM provider that always fails, standing in for an unreachable
/// endpoint.
pub struct UnreachableLlm;

impl LlmProvider for UnreachableLlm {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> doctrine::Result<String> {
        Err(doctrine::Error::Llm("connection refused".to_string()))
    }
}

pub fn test_config() -> DoctrineConfig {
    let mut config = DoctrineConfig::default();
    config.embedding.dimensions = DIMENSIONS;
    config.graph.enabled = true;
    config
}

/// Container with the scripted LLM.
pub fn container() -> ServiceContainer {
    container_with_llm(Box::new(ScriptedLlm))
}

/// Container with an explicit LLM provider.
pub fn container_with_llm(llm: Box<dyn LlmProvider>) -> ServiceContainer {
    let config = test_config();
    let store = Arc::new(DocumentStore::in_memory().unwrap());
    let embedding = Arc::new(EmbeddingPipeline::with_backends(
        None,
        Box::new(KeywordEmbedder),
        &config.embedding,
    ));
    let llm = Arc::new(LlmPipeline::new(llm, config.llm.extraction_retries));
    let resolver = EntityResolver::new(Some(Box::new(SqliteGraphStore::in_memory().unwrap())));
    ServiceContainer::with_components(config, store, embedding, llm, resolver)
}

/// Markdown for the spec-style document A: three sections with an
/// authoritative token lifetime.
pub const DOC_A: &str = "\
# Tokens

Access tokens expire after 1 hour. Tokens are signed with RS256. Tokens carry the user id.

# Sessions

Sessions last 24 hours and refresh on activity. Sessions are stored server side.

# Passwords

Passwords require at least 12 characters and a symbol. Passwords are hashed with argon2.
";

/// Paraphrased guide B covering the same ground as A.
pub const DOC_B: &str = "\
# Tokens

Access tokens expire after 1 hour of use. Tokens are signed with RS256 and tokens carry the user id.

# Sessions

Sessions last 24 hours, refresh on activity, and sessions are stored server side.

# Passwords

Passwords require at least 12 characters plus a symbol, and passwords are hashed with argon2.
";

/// Decision document C contradicting A's token lifetime.
pub const DOC_C: &str = "\
# Tokens

Access tokens now expire after 2 hours. Tokens are signed with RS256. Tokens carry the user id.
";
