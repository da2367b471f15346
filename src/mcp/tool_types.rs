//! Wire-level argument structs for the tools, and their conversions into
//! service requests.

use crate::models::{ConflictType, DocumentType, MergeStrategy, OutputFormat};
use crate::query::QueryRequest;
use crate::services::{ConsolidateRequest, DeprecateRequest, IngestRequest, OverlapRequest};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Arguments for `ingest_document`.
#[derive(Debug, Deserialize)]
pub struct IngestArgs {
    /// Path to a local file.
    pub file_path: Option<String>,
    /// Inline content.
    pub content: Option<String>,
    /// URL to fetch.
    pub url: Option<String>,
    /// Document type (required).
    pub document_type: String,
    /// Explicit title.
    pub title: Option<String>,
    /// Authority level [1..10].
    pub authority_level: Option<u8>,
    /// Tags.
    pub tags: Option<Vec<String>>,
    /// Extract claims (default true).
    pub extract_claims: Option<bool>,
    /// Generate embeddings (default true).
    pub generate_embeddings: Option<bool>,
    /// Build the entity graph (default true).
    pub build_entity_graph: Option<bool>,
}

impl IngestArgs {
    /// Converts into a service request.
    pub fn into_request(self) -> Result<IngestRequest> {
        let document_type = DocumentType::parse(&self.document_type).ok_or_else(|| {
            Error::Validation(format!(
                "document_type: '{}' not in enum",
                self.document_type
            ))
        })?;
        Ok(IngestRequest {
            file_path: self.file_path,
            content: self.content,
            url: self.url,
            document_type,
            title: self.title,
            authority_level: self.authority_level,
            tags: self.tags.unwrap_or_default().into_iter().collect::<BTreeSet<_>>(),
            extract_claims: self.extract_claims,
            generate_embeddings: self.generate_embeddings,
            build_entity_graph: self.build_entity_graph,
        })
    }
}

/// Arguments for `find_overlaps`.
#[derive(Debug, Deserialize)]
pub struct FindOverlapsArgs {
    /// Explicit document ids.
    pub document_ids: Option<Vec<String>>,
    /// Scope entries (ids or glob patterns).
    pub scope: Option<Vec<String>>,
    /// Tag filters.
    pub tags: Option<Vec<String>>,
    /// Clustering threshold (default 0.8).
    pub similarity_threshold: Option<f32>,
    /// Restrict reported conflicts to these types.
    pub conflict_types: Option<Vec<String>>,
    /// Include already-superseded conflicts (default false).
    pub include_resolved: Option<bool>,
}

impl FindOverlapsArgs {
    /// Converts into a service request.
    pub fn into_request(self) -> Result<OverlapRequest> {
        let document_ids = self.document_ids.unwrap_or_default();
        let scope = self.scope.unwrap_or_default();
        let tags = self.tags.unwrap_or_default();
        if document_ids.is_empty() && scope.is_empty() && tags.is_empty() {
            return Err(Error::Validation(
                "one of document_ids, scope, tags is required".to_string(),
            ));
        }
        let conflict_types = self
            .conflict_types
            .unwrap_or_default()
            .iter()
            .map(|s| {
                ConflictType::parse(s).ok_or_else(|| {
                    Error::Validation(format!("conflict_types: '{s}' not in enum"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(OverlapRequest {
            document_ids,
            scope,
            tags,
            similarity_threshold: self.similarity_threshold,
            conflict_types,
            include_resolved: self.include_resolved.unwrap_or(false),
        })
    }
}

/// Arguments for `consolidate_documents`.
#[derive(Debug, Deserialize)]
pub struct ConsolidateArgs {
    /// Explicit document ids.
    pub document_ids: Option<Vec<String>>,
    /// Scope entries (ids or glob patterns).
    pub scope: Option<Vec<String>>,
    /// Cluster ordinal from a prior overlap analysis.
    pub cluster_id: Option<usize>,
    /// Merge strategy (default smart).
    pub strategy: Option<String>,
    /// Conflict threshold (default 0.7).
    pub conflict_threshold: Option<f32>,
    /// Silent-resolution bound (default 0.3).
    pub auto_resolve_below: Option<f32>,
    /// Human-review bound (default 0.9).
    pub require_human_above: Option<f32>,
    /// Output format (default markdown).
    pub output_format: Option<String>,
    /// Emit provenance (default true).
    pub include_provenance: Option<bool>,
    /// Dry run (default false).
    pub dry_run: Option<bool>,
}

impl ConsolidateArgs {
    /// Converts into a service request.
    pub fn into_request(self) -> Result<ConsolidateRequest> {
        let document_ids = self.document_ids.unwrap_or_default();
        let scope = self.scope.unwrap_or_default();
        if document_ids.is_empty() && scope.is_empty() && self.cluster_id.is_none() {
            return Err(Error::Validation(
                "one of document_ids, scope, cluster_id is required".to_string(),
            ));
        }
        let strategy = self
            .strategy
            .as_deref()
            .map(|s| {
                MergeStrategy::parse(s)
                    .ok_or_else(|| Error::Validation(format!("strategy: '{s}' not in enum")))
            })
            .transpose()?;
        let output_format = self
            .output_format
            .as_deref()
            .map(|s| {
                OutputFormat::parse(s)
                    .ok_or_else(|| Error::Validation(format!("output_format: '{s}' not in enum")))
            })
            .transpose()?;
        Ok(ConsolidateRequest {
            document_ids,
            scope,
            cluster_id: self.cluster_id,
            strategy,
            conflict_threshold: self.conflict_threshold,
            auto_resolve_below: self.auto_resolve_below,
            require_human_above: self.require_human_above,
            output_format,
            include_provenance: self.include_provenance,
            dry_run: self.dry_run,
        })
    }
}

/// Arguments for `get_source_of_truth`.
#[derive(Debug, Deserialize)]
pub struct QueryArgs {
    /// The natural-language question (required).
    pub query: String,
    /// Free-form query category.
    pub query_type: Option<String>,
    /// Scope entries.
    pub scope: Option<Vec<String>>,
    /// Maximum source documents (default 5).
    pub max_sources: Option<usize>,
    /// Verify supporting claims (default false).
    pub verify_claims: Option<bool>,
    /// Include deprecated documents (default false).
    pub include_deprecated: Option<bool>,
}

impl QueryArgs {
    /// Converts into a service request.
    #[must_use]
    pub fn into_request(self) -> QueryRequest {
        QueryRequest {
            query: self.query,
            query_type: self.query_type,
            scope: self.scope.unwrap_or_default(),
            max_sources: self.max_sources,
            verify_claims: self.verify_claims,
            include_deprecated: self.include_deprecated,
        }
    }
}

/// Arguments for `deprecate_document`.
#[derive(Debug, Deserialize)]
pub struct DeprecateArgs {
    /// The document to deprecate (required).
    pub document_id: String,
    /// Why (required).
    pub reason: String,
    /// Replacement document.
    pub superseded_by: Option<String>,
    /// Migrate references to the replacement (default false).
    pub migrate_references: Option<bool>,
    /// Archive instead (default false).
    pub archive: Option<bool>,
}

impl DeprecateArgs {
    /// Converts into a service request.
    #[must_use]
    pub fn into_request(self) -> DeprecateRequest {
        DeprecateRequest {
            document_id: self.document_id,
            reason: self.reason,
            superseded_by: self.superseded_by,
            migrate_references: self.migrate_references,
            archive: self.archive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ingest_args_bad_type() {
        let args: IngestArgs = serde_json::from_value(json!({
            "content": "x",
            "document_type": "novel"
        }))
        .unwrap();
        let err = args.into_request().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_overlap_args_require_scope() {
        let args: FindOverlapsArgs = serde_json::from_value(json!({})).unwrap();
        assert!(args.into_request().is_err());
    }

    #[test]
    fn test_consolidate_args_strategy_parse() {
        let args: ConsolidateArgs = serde_json::from_value(json!({
            "document_ids": ["x"],
            "strategy": "authority_wins"
        }))
        .unwrap();
        let request = args.into_request().unwrap();
        assert_eq!(request.strategy, Some(MergeStrategy::AuthorityWins));
    }
}
