//! # Doctrine
//!
//! A document knowledge consolidation service.
//!
//! Doctrine ingests heterogeneous text documents, splits them into
//! retrievable sections, extracts atomic claims, detects semantic overlap
//! and logical conflict across documents, and produces a single
//! authoritative merged document with full per-section provenance. It is
//! exposed as an MCP tool server over line-delimited JSON-RPC on stdio.
//!
//! ## Architecture
//!
//! - Three pipelines feed the store: the parser (sections), the embedding
//!   pipeline (vectors), and the claim extractor (subject/predicate/object
//!   triples via an LLM).
//! - The conflict detector and merge engine operate on persisted sections,
//!   claims, and vectors to answer `find_overlaps` and
//!   `consolidate_documents`.
//! - The query engine answers `get_source_of_truth` with vector retrieval,
//!   optional claim verification, and conflict surfacing.
//!
//! ## Example
//!
//! ```rust,ignore
//! use doctrine::models::DocumentType;
//! use doctrine::services::{IngestRequest, ServiceContainer};
//!
//! let services = ServiceContainer::open(config)?;
//! let report = services.ingest_document(IngestRequest {
//!     content: Some("# Tokens\nAccess tokens expire after 1 hour.".into()),
//!     document_type: DocumentType::Spec,
//!     ..Default::default()
//! })?;
//! println!("ingested {}", report.document_id);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod conflict;
pub mod embedding;
pub mod extract;
pub mod graph;
pub mod llm;
pub mod mcp;
pub mod merge;
pub mod models;
pub mod observability;
pub mod parser;
pub mod query;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::DoctrineConfig;
pub use embedding::Embedder;
pub use llm::LlmProvider;
pub use models::{
    Claim, ClaimId, ConflictPair, ConflictType, Document, DocumentId, DocumentStatus,
    DocumentType, MergeStrategy, OutputFormat, OverlapCluster, Section, SectionId, Supersession,
};
pub use services::ServiceContainer;
pub use storage::DocumentStore;

/// Error type for doctrine operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait
/// implementations. Every variant maps to a JSON-RPC error object at the
/// tool boundary (see `mcp::rpc`); variants marked "partial success" are
/// converted to `warnings[]` entries by the service layer instead of
/// failing the call.
#[derive(Debug, ThisError)]
pub enum Error {
    /// A request failed schema validation.
    ///
    /// Carries the offending field path so callers can locate the problem.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced document or section does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Content with an identical hash is already stored.
    ///
    /// Never surfaced to callers: the ingest path converts it into an
    /// idempotent metadata update on the existing document.
    #[error("duplicate content: already stored as {document_id}")]
    DuplicateContent {
        /// The id of the existing document with the same content hash.
        document_id: String,
    },

    /// Both the embedding subprocess and the remote fallback are exhausted.
    ///
    /// Ingest proceeds without vectors and records a warning; vectors are
    /// back-filled on the next ingest of the same content.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// An LLM call exceeded its configured timeout.
    #[error("llm call timed out after {seconds}s")]
    LlmTimeout {
        /// The timeout that expired, in seconds.
        seconds: u64,
    },

    /// An LLM call failed for a reason other than timeout.
    #[error("llm error: {0}")]
    Llm(String),

    /// The entity graph store is unreachable.
    ///
    /// The resolver degrades to a no-op; ingestion never fails on this.
    #[error("graph store unavailable: {0}")]
    GraphUnavailable(String),

    /// A persistence operation failed.
    ///
    /// Transactions roll back; transient failures are retried once before
    /// this is raised.
    #[error("persistence operation '{operation}' failed: {cause}")]
    Persistence {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Structured extraction failed after all retries.
    ///
    /// The operation that needed the structure treats the result as empty.
    #[error("structured extraction failed after {attempts} attempts: {cause}")]
    StructuredExtraction {
        /// How many attempts were made.
        attempts: u32,
        /// The final parse failure.
        cause: String,
    },
}

/// Result type alias for doctrine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so every `created_at`/`modified_at` stamp comes from one
/// place. Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("document_type: not in enum".to_string());
        assert_eq!(
            err.to_string(),
            "validation failed: document_type: not in enum"
        );

        let err = Error::Persistence {
            operation: "insert_document".to_string(),
            cause: "disk full".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "persistence operation 'insert_document' failed: disk full"
        );

        let err = Error::LlmTimeout { seconds: 600 };
        assert_eq!(err.to_string(), "llm call timed out after 600s");
    }

    #[test]
    fn test_current_timestamp_reasonable() {
        let ts = current_timestamp();
        // After 2020-01-01.
        assert!(ts > 1_577_836_800);
    }
}
