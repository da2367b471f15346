//! Consolidation (`consolidate_documents`).
//!
//! Resolves the scope, clusters overlapping sections, applies the chosen
//! strategy, partitions conflicts, renders the output, and, unless the
//! run is a dry run, persists the consolidated document and the
//! supersession links.

use super::ServiceContainer;
use crate::conflict::ConflictDetector;
use crate::config::ConflictConfig;
use crate::merge::{MergeThresholds, render_json, render_markdown, render_yaml};
use crate::models::{
    ConflictPair, ConsolidationStatistics, Document, DocumentId, DocumentStatus, DocumentType,
    MergeStrategy, OutputFormat, ProvenanceMap, Section, SectionId,
};
use crate::parser::parse_document;
use crate::{Error, Result, current_timestamp};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use tracing::instrument;

/// Parameters for one consolidation.
#[derive(Debug, Clone, Default)]
pub struct ConsolidateRequest {
    /// Explicit document ids.
    pub document_ids: Vec<String>,
    /// Scope entries: ids, `tag:` filters, or title globs.
    pub scope: Vec<String>,
    /// Cluster ordinal from a fresh overlap analysis over all
    /// retrievable documents.
    pub cluster_id: Option<usize>,
    /// Merge strategy (default smart).
    pub strategy: Option<MergeStrategy>,
    /// Minimum strength for a pair to count as a conflict (default 0.7).
    pub conflict_threshold: Option<f32>,
    /// Conflicts below this resolve silently (default 0.3).
    pub auto_resolve_below: Option<f32>,
    /// Conflicts above this go to human review (default 0.9).
    pub require_human_above: Option<f32>,
    /// Output format (default markdown).
    pub output_format: Option<OutputFormat>,
    /// Emit provenance (default true).
    pub include_provenance: Option<bool>,
    /// Perform all analysis but persist nothing (default false).
    pub dry_run: Option<bool>,
}

/// Consolidation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsolidationStatus {
    /// Output persisted; no conflicts pending.
    Completed,
    /// Output persisted, but conflicts above the review bar remain.
    PendingReview,
    /// The run could not produce an output document.
    Failed,
    /// Dry run; nothing was persisted.
    Preview,
}

impl fmt::Display for ConsolidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::PendingReview => "pending_review",
            Self::Failed => "failed",
            Self::Preview => "preview",
        };
        write!(f, "{s}")
    }
}

/// The rendered consolidated document.
#[derive(Debug, Clone, Serialize)]
pub struct OutputDocument {
    /// Id of the persisted document (absent on dry runs).
    pub document_id: Option<DocumentId>,
    /// Title.
    pub title: String,
    /// Rendered content in the requested format.
    pub content: String,
    /// The format of `content`.
    pub format: OutputFormat,
}

/// Result of one consolidation.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidateReport {
    /// Identifier for this run.
    pub consolidation_id: String,
    /// Run status.
    pub status: ConsolidationStatus,
    /// The consolidated output.
    pub output_document: Option<OutputDocument>,
    /// The documents that were consolidated.
    pub source_documents: Vec<DocumentId>,
    /// Conflicts resolved by the strategy.
    pub conflicts_resolved: usize,
    /// Conflicts needing human review; not incorporated into the output.
    pub conflicts_pending: Vec<ConflictPair>,
    /// Header → contributing document ids.
    pub provenance_map: ProvenanceMap,
    /// Run counters.
    pub statistics: ConsolidationStatistics,
    /// Warnings (enrichment and persistence side issues).
    pub warnings: Vec<String>,
}

impl ServiceContainer {
    /// Consolidates the requested documents into one authoritative
    /// output with provenance.
    #[instrument(skip(self, request))]
    pub fn consolidate_documents(&self, request: ConsolidateRequest) -> Result<ConsolidateReport> {
        let source_documents = self.resolve_consolidation_scope(&request)?;
        if source_documents.is_empty() {
            return Err(Error::Validation(
                "no documents matched the requested scope".to_string(),
            ));
        }

        let strategy = request.strategy.unwrap_or_default();
        let dry_run = request.dry_run.unwrap_or(false);
        let include_provenance = request.include_provenance.unwrap_or(true);
        let format = request.output_format.unwrap_or_default();

        let thresholds = MergeThresholds {
            cluster_cutoff: self.config().merge.cluster_cutoff,
            auto_resolve_below: request
                .auto_resolve_below
                .unwrap_or(self.config().merge.auto_resolve_below),
            require_human_above: request
                .require_human_above
                .unwrap_or(self.config().merge.require_human_above),
        };
        // The conflict threshold governs which pairs count as conflicts
        // for this run.
        let detector = ConflictDetector::new(
            ConflictConfig {
                semantic_threshold: self.config().conflict.semantic_threshold,
                min_strength: request.conflict_threshold.unwrap_or(0.7),
            },
            None,
        );

        let (inputs, claim_vectors) = self.load_merge_inputs(&source_documents)?;
        let outcome = self.merge_engine().merge(
            &inputs,
            strategy,
            thresholds,
            &detector,
            &claim_vectors,
        );

        let title = consolidated_title(&inputs.iter().map(|i| &i.document).collect::<Vec<_>>());
        let markdown = render_markdown(&title, &outcome.merged_sections, include_provenance);
        let content = match format {
            OutputFormat::Markdown => markdown.clone(),
            OutputFormat::Json => {
                let value = render_json(
                    &title,
                    &outcome.merged_sections,
                    &outcome.provenance,
                    include_provenance,
                );
                serde_json::to_string_pretty(&value)
                    .map_err(|e| Error::Validation(format!("json rendering failed: {e}")))?
            },
            OutputFormat::Yaml => render_yaml(
                &title,
                &outcome.merged_sections,
                &outcome.provenance,
                include_provenance,
            )?,
        };

        let consolidation_id = uuid::Uuid::new_v4().to_string();
        let mut warnings = Vec::new();

        let (status, document_id) = if dry_run {
            (ConsolidationStatus::Preview, None)
        } else {
            let authority = inputs
                .iter()
                .map(|i| i.document.authority_level)
                .max()
                .unwrap_or(5);
            let document_id = self.persist_output(
                &title,
                &markdown,
                authority,
                &source_documents,
                strategy,
                &mut warnings,
            )?;
            let status = if outcome.conflicts_pending.is_empty() {
                ConsolidationStatus::Completed
            } else {
                ConsolidationStatus::PendingReview
            };
            (status, Some(document_id))
        };

        metrics::counter!("doctrine_consolidations_total").increment(1);

        Ok(ConsolidateReport {
            consolidation_id,
            status,
            output_document: Some(OutputDocument {
                document_id,
                title,
                content,
                format,
            }),
            source_documents,
            conflicts_resolved: outcome.conflicts_resolved.len(),
            conflicts_pending: outcome.conflicts_pending,
            provenance_map: outcome.provenance,
            statistics: outcome.statistics,
            warnings,
        })
    }

    fn resolve_consolidation_scope(
        &self,
        request: &ConsolidateRequest,
    ) -> Result<Vec<DocumentId>> {
        if let Some(cluster_ordinal) = request.cluster_id {
            // Clusters are computed on demand, never persisted: recompute
            // them over all retrievable documents and pick the requested
            // ordinal.
            let ids: Vec<DocumentId> = self
                .store()
                .list_documents(false)?
                .into_iter()
                .map(|d| d.id)
                .collect();
            let (_, clusters) = crate::merge::MergeEngine::overlap_clusters(
                &self.load_merge_inputs(&ids)?.0,
                self.config().merge.cluster_cutoff,
            );
            let cluster = clusters
                .into_iter()
                .find(|c| c.cluster_id == cluster_ordinal)
                .ok_or_else(|| Error::NotFound(format!("cluster {cluster_ordinal}")))?;
            return Ok(cluster.document_ids);
        }

        // Explicitly listed ids must exist.
        for id in &request.document_ids {
            if uuid::Uuid::parse_str(id).is_err() {
                return Err(Error::Validation(format!(
                    "document_ids: '{id}' is not a document id"
                )));
            }
            if self.store().get_document(&DocumentId::from(id.as_str()))?.is_none() {
                return Err(Error::NotFound(format!("document {id}")));
            }
        }
        self.resolve_documents(&request.document_ids, &request.scope, &[], false)
    }

    /// Persists the consolidated document, marks the sources superseded,
    /// and appends the supersession links.
    fn persist_output(
        &self,
        title: &str,
        markdown: &str,
        authority_level: u8,
        sources: &[DocumentId],
        strategy: MergeStrategy,
        warnings: &mut Vec<String>,
    ) -> Result<DocumentId> {
        let parsed = parse_document(markdown, title);
        let now = current_timestamp();
        let mut tags = BTreeSet::new();
        tags.insert("consolidated".to_string());

        let document = Document {
            id: DocumentId::generate(),
            content_hash: hex::encode(Sha256::digest(markdown.as_bytes())),
            title: title.to_string(),
            document_type: DocumentType::Reference,
            authority_level,
            tags,
            status: DocumentStatus::Active,
            raw_content: markdown.to_string(),
            created_at: now,
            modified_at: now,
        };
        let sections: Vec<Section> = parsed
            .sections
            .iter()
            .enumerate()
            .map(|(ordinal, s)| Section {
                id: SectionId::generate(),
                document_id: document.id.clone(),
                header: s.header.clone(),
                level: s.level,
                content: s.content.clone(),
                byte_range: s.byte_range,
                ordinal,
            })
            .collect();

        let document_id = match self
            .store()
            .insert_document_with_sections(&document, &sections)
        {
            Ok(()) => {
                if let Err(e) = self.embed_sections_of(&document.id) {
                    warnings.push(format!("output embeddings skipped: {e}"));
                }
                document.id
            },
            Err(Error::DuplicateContent { document_id }) => {
                warnings.push("identical consolidation already exists".to_string());
                DocumentId::from(document_id)
            },
            Err(e) => return Err(e),
        };

        for source in sources {
            if source == &document_id {
                continue;
            }
            let reason = format!("consolidated via {strategy} into {document_id}");
            if let Err(e) = self
                .store()
                .append_supersession(source, &document_id, &reason)
            {
                warnings.push(format!("supersession for {source} not recorded: {e}"));
                continue;
            }
            if let Err(e) = self
                .store()
                .set_document_status(source, DocumentStatus::Superseded)
            {
                warnings.push(format!("status for {source} not updated: {e}"));
            }
        }

        Ok(document_id)
    }

    fn embed_sections_of(&self, document_id: &DocumentId) -> Result<()> {
        let sections = self.store().sections_for_document(document_id)?;
        self.embed_sections(&sections)
    }
}

/// Title for the consolidated output, derived from the source titles.
fn consolidated_title(documents: &[&Document]) -> String {
    let mut titles: Vec<&str> = Vec::new();
    for document in documents {
        let title = document.title.as_str();
        if !titles.contains(&title) {
            titles.push(title);
        }
    }
    match titles.as_slice() {
        [] => "Consolidated Document".to_string(),
        [one] => format!("Consolidated: {one}"),
        [first, second] => format!("Consolidated: {first} + {second}"),
        [first, second, rest @ ..] => {
            format!("Consolidated: {first} + {second} (+{} more)", rest.len())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(title: &str) -> Document {
        Document {
            id: DocumentId::generate(),
            content_hash: title.to_string(),
            title: title.to_string(),
            document_type: DocumentType::Spec,
            authority_level: 5,
            tags: BTreeSet::new(),
            status: DocumentStatus::Active,
            raw_content: String::new(),
            created_at: 0,
            modified_at: 0,
        }
    }

    #[test]
    fn test_consolidated_title_shapes() {
        let a = doc("Auth Spec");
        let b = doc("Auth Guide");
        let c = doc("Auth Notes");
        assert_eq!(consolidated_title(&[&a]), "Consolidated: Auth Spec");
        assert_eq!(
            consolidated_title(&[&a, &b]),
            "Consolidated: Auth Spec + Auth Guide"
        );
        assert_eq!(
            consolidated_title(&[&a, &b, &c]),
            "Consolidated: Auth Spec + Auth Guide (+1 more)"
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConsolidationStatus::PendingReview.to_string(), "pending_review");
        assert_eq!(ConsolidationStatus::Preview.to_string(), "preview");
    }
}
