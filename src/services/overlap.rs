//! Overlap and conflict analysis (`find_overlaps`).

use super::ServiceContainer;
use crate::merge::{MergeEngine, SectionForMerge};
use crate::models::{
    Claim, ConflictPair, ConflictType, DocumentId, OverlapCluster, VectorOwner,
};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::instrument;

/// Parameters for overlap analysis.
#[derive(Debug, Clone, Default)]
pub struct OverlapRequest {
    /// Explicit document ids.
    pub document_ids: Vec<String>,
    /// Scope entries: ids, `tag:` filters, or title globs.
    pub scope: Vec<String>,
    /// Tag filters (sugar for `tag:` scope entries).
    pub tags: Vec<String>,
    /// Clustering similarity threshold (default 0.8).
    pub similarity_threshold: Option<f32>,
    /// Restrict reported conflicts to these types.
    pub conflict_types: Vec<ConflictType>,
    /// Include conflicts between documents that are already superseded
    /// (default false).
    pub include_resolved: bool,
}

/// Result of overlap analysis.
#[derive(Debug, Clone, Serialize)]
pub struct OverlapReport {
    /// Clusters of same-topic sections.
    pub overlap_clusters: Vec<OverlapCluster>,
    /// Detected conflicts, strongest first.
    pub conflict_pairs: Vec<ConflictPair>,
    /// Share of sections sitting in cross-document clusters, on [0, 100].
    pub redundancy_score: f32,
    /// Human-readable consolidation hints.
    pub recommendations: Vec<String>,
    /// Analysis warnings.
    pub warnings: Vec<String>,
}

impl ServiceContainer {
    /// Finds overlapping sections and conflicting claims across the
    /// requested documents.
    #[instrument(skip(self, request))]
    pub fn find_overlaps(&self, request: OverlapRequest) -> Result<OverlapReport> {
        let document_ids = self.resolve_documents(
            &request.document_ids,
            &request.scope,
            &request.tags,
            false,
        )?;
        if document_ids.is_empty() {
            return Ok(OverlapReport {
                overlap_clusters: Vec::new(),
                conflict_pairs: Vec::new(),
                redundancy_score: 0.0,
                recommendations: vec!["no documents matched the requested scope".to_string()],
                warnings: Vec::new(),
            });
        }

        let (inputs, claim_vectors) = self.load_merge_inputs(&document_ids)?;
        let threshold = request
            .similarity_threshold
            .unwrap_or(self.config().merge.cluster_cutoff);
        let (index_clusters, clusters) = MergeEngine::overlap_clusters(&inputs, threshold);

        // Conflicts are evaluated inside each cluster, across documents.
        let detector = self.detector();
        let mut conflict_pairs: Vec<ConflictPair> = Vec::new();
        for members in &index_clusters {
            let cluster_claims: Vec<Claim> = members
                .iter()
                .flat_map(|&m| inputs[m].claims.iter().cloned())
                .collect();
            conflict_pairs.extend(detector.detect_all(&cluster_claims, &claim_vectors));
        }
        conflict_pairs.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if !request.conflict_types.is_empty() {
            conflict_pairs.retain(|p| request.conflict_types.contains(&p.conflict_type));
        }
        if !request.include_resolved {
            conflict_pairs = self.drop_resolved_pairs(conflict_pairs)?;
        }

        let mut warnings = Vec::new();
        if self.resolver().enabled() {
            warnings.extend(self.resolver().link_conflicts(&conflict_pairs));
        }

        let redundancy_score = redundancy(&clusters, inputs.len());
        let recommendations = recommend(&clusters, &conflict_pairs, redundancy_score);

        Ok(OverlapReport {
            overlap_clusters: clusters,
            conflict_pairs,
            redundancy_score,
            recommendations,
            warnings,
        })
    }

    /// Resolves the union of explicit ids, scope entries, and tag
    /// filters.
    pub(crate) fn resolve_documents(
        &self,
        document_ids: &[String],
        scope: &[String],
        tags: &[String],
        include_hidden: bool,
    ) -> Result<Vec<DocumentId>> {
        let mut entries: Vec<String> = Vec::new();
        entries.extend(document_ids.iter().cloned());
        entries.extend(scope.iter().cloned());
        entries.extend(tags.iter().map(|t| format!("tag:{t}")));
        self.store().resolve_scope(&entries, include_hidden)
    }

    /// Loads every section of the given documents with its document,
    /// vector, and claims, plus the claim-vector map for conflict
    /// detection.
    pub(crate) fn load_merge_inputs(
        &self,
        document_ids: &[DocumentId],
    ) -> Result<(Vec<SectionForMerge>, HashMap<String, Vec<f32>>)> {
        let mut inputs = Vec::new();
        let mut claim_ids: Vec<String> = Vec::new();

        for document_id in document_ids {
            let Some(document) = self.store().get_document(document_id)? else {
                return Err(Error::NotFound(format!("document {document_id}")));
            };
            for section in self.store().sections_for_document(document_id)? {
                let vector = self
                    .store()
                    .get_vector(VectorOwner::Section, section.id.as_str())?;
                let claims = self.store().claims_for_section(&section.id)?;
                claim_ids.extend(claims.iter().map(|c| c.id.as_str().to_string()));
                inputs.push(SectionForMerge {
                    section,
                    document: document.clone(),
                    vector,
                    claims,
                });
            }
        }

        let claim_vectors = self
            .store()
            .vectors_for_owners(VectorOwner::Claim, &claim_ids)?;
        Ok((inputs, claim_vectors))
    }

    /// Drops pairs whose documents have both already been superseded.
    fn drop_resolved_pairs(&self, pairs: Vec<ConflictPair>) -> Result<Vec<ConflictPair>> {
        let mut kept = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let a_superseded = !self
                .store()
                .supersessions_of(&pair.claim_a.document_id)?
                .is_empty();
            let b_superseded = !self
                .store()
                .supersessions_of(&pair.claim_b.document_id)?
                .is_empty();
            if !(a_superseded && b_superseded) {
                kept.push(pair);
            }
        }
        Ok(kept)
    }
}

fn redundancy(clusters: &[OverlapCluster], total_sections: usize) -> f32 {
    if total_sections == 0 {
        return 0.0;
    }
    let overlapping: usize = clusters
        .iter()
        .filter(|c| c.is_cross_document())
        .map(|c| c.section_ids.len())
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let score = 100.0 * overlapping as f32 / total_sections as f32;
    score.clamp(0.0, 100.0)
}

fn recommend(
    clusters: &[OverlapCluster],
    conflicts: &[ConflictPair],
    redundancy_score: f32,
) -> Vec<String> {
    let mut out = Vec::new();
    for cluster in clusters.iter().filter(|c| c.is_cross_document()) {
        out.push(format!(
            "consolidate {} sections covering '{}' ({} documents, mean similarity {:.2})",
            cluster.section_ids.len(),
            cluster.topic,
            cluster.document_ids.len(),
            cluster.mean_similarity,
        ));
    }
    if !conflicts.is_empty() {
        out.push(format!(
            "resolve {} conflicting claim pair(s); strongest is {} at {:.2}",
            conflicts.len(),
            conflicts[0].conflict_type,
            conflicts[0].strength,
        ));
    }
    if out.is_empty() && redundancy_score == 0.0 {
        out.push("no cross-document overlap detected".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redundancy_score() {
        let cross = OverlapCluster {
            cluster_id: 0,
            topic: "Tokens".to_string(),
            section_ids: vec![
                crate::models::SectionId::generate(),
                crate::models::SectionId::generate(),
            ],
            document_ids: vec![DocumentId::generate(), DocumentId::generate()],
            mean_similarity: 0.9,
        };
        let single = OverlapCluster {
            cluster_id: 1,
            topic: "Other".to_string(),
            section_ids: vec![crate::models::SectionId::generate()],
            document_ids: vec![DocumentId::generate()],
            mean_similarity: 1.0,
        };
        let score = redundancy(&[cross, single], 4);
        assert!((score - 50.0).abs() < f32::EPSILON);
        assert!((redundancy(&[], 0) - 0.0).abs() < f32::EPSILON);
    }
}
