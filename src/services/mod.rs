//! Service layer: process-wide state and the tool operations.
//!
//! [`ServiceContainer`] is the process-wide state `S`: every pipeline is
//! initialized once during startup and handed to tool handlers by
//! reference. Teardown reverses the initialization order. Each tool
//! operation lives in its own module as an `impl ServiceContainer` block.

mod consolidate;
mod ingest;
mod lifecycle;
mod overlap;

pub use consolidate::{ConsolidateRequest, ConsolidateReport, ConsolidationStatus, OutputDocument};
pub use ingest::{IngestRequest, IngestReport};
pub use lifecycle::{DeprecateReport, DeprecateRequest};
pub use overlap::{OverlapReport, OverlapRequest};

use crate::config::DoctrineConfig;
use crate::conflict::ConflictDetector;
use crate::embedding::EmbeddingPipeline;
use crate::extract::ClaimExtractor;
use crate::graph::{EntityResolver, SqliteGraphStore};
use crate::llm::{HttpLlmClient, LlmPipeline, LlmProvider};
use crate::merge::MergeEngine;
use crate::storage::DocumentStore;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Process-wide state: pipelines, engines, and the store.
pub struct ServiceContainer {
    config: DoctrineConfig,
    store: Arc<DocumentStore>,
    embedding: Arc<EmbeddingPipeline>,
    llm: Arc<LlmPipeline>,
    extractor: ClaimExtractor,
    detector: ConflictDetector,
    merge: MergeEngine,
    resolver: EntityResolver,
}

impl ServiceContainer {
    /// Opens the container with production wiring.
    ///
    /// Persistence must be healthy; everything else degrades. The
    /// embedding helper is not started here; its first use blocks on
    /// initialization instead, so readiness is never delayed by model
    /// loading.
    pub fn open(config: DoctrineConfig) -> Result<Self> {
        let store = Arc::new(DocumentStore::open(&config.storage.db_path)?);
        let embedding = Arc::new(EmbeddingPipeline::from_config(&config.embedding));
        let llm_client: Box<dyn LlmProvider> = Box::new(HttpLlmClient::from_config(&config.llm));
        let llm = Arc::new(LlmPipeline::new(llm_client, config.llm.extraction_retries));

        let resolver = if config.graph.enabled {
            match SqliteGraphStore::open(&config.graph.db_path) {
                Ok(graph) => EntityResolver::new(Some(Box::new(graph))),
                Err(e) => {
                    tracing::warn!(error = %e, "graph store unavailable, entity graph disabled");
                    EntityResolver::new(None)
                },
            }
        } else {
            EntityResolver::new(None)
        };

        Ok(Self::assemble(config, store, embedding, llm, resolver))
    }

    /// Assembles a container from explicit components (test wiring).
    #[must_use]
    pub fn with_components(
        config: DoctrineConfig,
        store: Arc<DocumentStore>,
        embedding: Arc<EmbeddingPipeline>,
        llm: Arc<LlmPipeline>,
        resolver: EntityResolver,
    ) -> Self {
        Self::assemble(config, store, embedding, llm, resolver)
    }

    fn assemble(
        config: DoctrineConfig,
        store: Arc<DocumentStore>,
        embedding: Arc<EmbeddingPipeline>,
        llm: Arc<LlmPipeline>,
        resolver: EntityResolver,
    ) -> Self {
        let extractor = ClaimExtractor::new(Arc::clone(&llm), config.extraction.clone());
        let detector = ConflictDetector::new(config.conflict.clone(), Some(Arc::clone(&llm)));
        let merge = MergeEngine::new(config.merge.clone());
        Self {
            config,
            store,
            embedding,
            llm,
            extractor,
            detector,
            merge,
            resolver,
        }
    }

    /// Probes optional endpoints and logs the results. Non-fatal; called
    /// once at startup before readiness is announced.
    pub fn probe_endpoints(&self) {
        if self.llm.is_available() {
            tracing::info!(provider = self.llm.provider_name(), "llm endpoint reachable");
        } else {
            tracing::warn!(
                "llm endpoint unreachable; claim extraction and synthesis will degrade"
            );
        }
        tracing::info!(
            graph_enabled = self.resolver.enabled(),
            dimensions = self.embedding.dimensions(),
            "pipelines initialized"
        );
    }

    /// Tears the container down in reverse initialization order.
    pub fn shutdown(&self) {
        let wait = Duration::from_secs(self.config.server.helper_shutdown_secs);
        self.embedding.shutdown(wait);
        tracing::info!("service container shut down");
    }

    /// The loaded configuration.
    #[must_use]
    pub const fn config(&self) -> &DoctrineConfig {
        &self.config
    }

    /// The authoritative store.
    #[must_use]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// The embedding pipeline.
    #[must_use]
    pub fn embedding(&self) -> &EmbeddingPipeline {
        &self.embedding
    }

    /// The LLM pipeline.
    #[must_use]
    pub fn llm(&self) -> &LlmPipeline {
        &self.llm
    }

    /// The claim extractor.
    #[must_use]
    pub const fn extractor(&self) -> &ClaimExtractor {
        &self.extractor
    }

    /// The conflict detector.
    #[must_use]
    pub const fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    /// The merge engine.
    #[must_use]
    pub const fn merge_engine(&self) -> &MergeEngine {
        &self.merge
    }

    /// The entity resolver.
    #[must_use]
    pub const fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }
}
