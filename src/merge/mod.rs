//! Merge engine.
//!
//! Groups overlapping sections into clusters, applies the selected
//! strategy per cluster, runs conflict detection across each cluster's
//! claims, and emits merged output with per-section provenance.

mod cluster;
mod render;

pub use cluster::{cluster_by_similarity, mean_pairwise_similarity};
pub use render::{render_json, render_markdown, render_yaml};

use crate::config::MergeConfig;
use crate::conflict::ConflictDetector;
use crate::models::{
    Claim, ConflictPair, ConsolidationStatistics, Document, DocumentId, MergeStrategy,
    OverlapCluster, ProvenanceMap, Section,
};
use std::collections::HashMap;

/// One section prepared for merging, with everything the strategies need.
pub struct SectionForMerge {
    /// The section itself.
    pub section: Section,
    /// Its owning document (authority, recency, title).
    pub document: Document,
    /// Its normalized vector, when embeddings exist.
    pub vector: Option<Vec<f32>>,
    /// Its extracted claims.
    pub claims: Vec<Claim>,
}

/// A section of the consolidated output.
#[derive(Debug, Clone)]
pub struct MergedSection {
    /// Section header.
    pub header: String,
    /// Section body.
    pub body: String,
    /// Contributing source documents, the chosen one first.
    pub sources: Vec<DocumentId>,
    /// Conflict annotations rendered into the output.
    pub annotations: Vec<String>,
}

/// The result of one merge run.
pub struct MergeOutcome {
    /// Output sections in order.
    pub merged_sections: Vec<MergedSection>,
    /// Header → contributing document ids.
    pub provenance: ProvenanceMap,
    /// The overlap clusters that were formed.
    pub clusters: Vec<OverlapCluster>,
    /// Conflicts resolved (silently or with annotation).
    pub conflicts_resolved: Vec<ConflictPair>,
    /// Conflicts above the human-review bar; not incorporated.
    pub conflicts_pending: Vec<ConflictPair>,
    /// Run counters.
    pub statistics: ConsolidationStatistics,
}

/// Per-run threshold overrides (callers may tighten or loosen the
/// configured defaults per consolidation).
#[derive(Debug, Clone, Copy)]
pub struct MergeThresholds {
    /// Clustering similarity cutoff.
    pub cluster_cutoff: f32,
    /// Conflicts below this strength resolve silently.
    pub auto_resolve_below: f32,
    /// Conflicts above this strength go to human review.
    pub require_human_above: f32,
}

impl From<&MergeConfig> for MergeThresholds {
    fn from(config: &MergeConfig) -> Self {
        Self {
            cluster_cutoff: config.cluster_cutoff,
            auto_resolve_below: config.auto_resolve_below,
            require_human_above: config.require_human_above,
        }
    }
}

/// Strategy-driven merge engine.
pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    /// Creates an engine with the configured defaults.
    #[must_use]
    pub const fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// The configured default thresholds.
    #[must_use]
    pub fn default_thresholds(&self) -> MergeThresholds {
        MergeThresholds::from(&self.config)
    }

    /// Clusters sections by vector similarity. Sections without vectors
    /// become singleton clusters.
    #[must_use]
    pub fn overlap_clusters(
        inputs: &[SectionForMerge],
        cutoff: f32,
    ) -> (Vec<Vec<usize>>, Vec<OverlapCluster>) {
        let with_vectors: Vec<usize> = (0..inputs.len())
            .filter(|&i| inputs[i].vector.is_some())
            .collect();
        let vectors: Vec<&[f32]> = with_vectors
            .iter()
            .filter_map(|&i| inputs[i].vector.as_deref())
            .collect();

        let mut index_clusters: Vec<Vec<usize>> = cluster_by_similarity(&vectors, cutoff)
            .into_iter()
            .map(|members| members.into_iter().map(|m| with_vectors[m]).collect())
            .collect();
        for (i, input) in inputs.iter().enumerate() {
            if input.vector.is_none() {
                index_clusters.push(vec![i]);
            }
        }
        index_clusters.sort_by_key(|m| m.first().copied().unwrap_or(0));

        let views = index_clusters
            .iter()
            .enumerate()
            .map(|(cluster_id, members)| {
                let member_vectors: Vec<&[f32]> = inputs
                    .iter()
                    .map(|i| i.vector.as_deref().unwrap_or(&[]))
                    .collect();
                let mean = cluster::mean_pairwise_similarity(&member_vectors, members);
                let topic = central_header(inputs, members);
                let mut document_ids: Vec<DocumentId> = Vec::new();
                for &m in members {
                    if !document_ids.contains(&inputs[m].document.id) {
                        document_ids.push(inputs[m].document.id.clone());
                    }
                }
                OverlapCluster {
                    cluster_id,
                    topic,
                    section_ids: members.iter().map(|&m| inputs[m].section.id.clone()).collect(),
                    document_ids,
                    mean_similarity: mean,
                }
            })
            .collect();

        (index_clusters, views)
    }

    /// Runs a full merge over the prepared sections.
    #[must_use]
    pub fn merge(
        &self,
        inputs: &[SectionForMerge],
        strategy: MergeStrategy,
        thresholds: MergeThresholds,
        detector: &ConflictDetector,
        claim_vectors: &HashMap<String, Vec<f32>>,
    ) -> MergeOutcome {
        let (index_clusters, cluster_views) =
            Self::overlap_clusters(inputs, thresholds.cluster_cutoff);

        let mut merged_sections = Vec::with_capacity(index_clusters.len());
        let mut provenance = ProvenanceMap::new();
        let mut conflicts_resolved = Vec::new();
        let mut conflicts_pending = Vec::new();

        for members in &index_clusters {
            let chosen = choose_representative(inputs, members, strategy);
            let chosen_input = &inputs[chosen];

            // Conflict detection across all claim pairs inside the cluster.
            let cluster_claims: Vec<Claim> = members
                .iter()
                .flat_map(|&m| inputs[m].claims.iter().cloned())
                .collect();
            let conflicts = detector.detect_all(&cluster_claims, claim_vectors);

            let mut annotations = Vec::new();
            for conflict in conflicts {
                if conflict.strength > thresholds.require_human_above {
                    conflicts_pending.push(conflict);
                } else {
                    if conflict.strength >= thresholds.auto_resolve_below {
                        annotations.push(format!(
                            "Conflict ({}, strength {:.2}): \"{}\" vs \"{}\"; kept the version from {}.",
                            conflict.conflict_type,
                            conflict.strength,
                            conflict.claim_a.statement(),
                            conflict.claim_b.statement(),
                            chosen_input.document.id,
                        ));
                    }
                    conflicts_resolved.push(conflict);
                }
            }

            let header = if strategy == MergeStrategy::MergeAll {
                central_header(inputs, members)
            } else {
                chosen_input.section.header.clone()
            };

            let body = if strategy == MergeStrategy::MergeAll && members.len() > 1 {
                members
                    .iter()
                    .map(|&m| {
                        let input = &inputs[m];
                        format!(
                            "**From {} ({})**:\n\n{}",
                            input.document.title, input.document.id, input.section.content
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n")
            } else {
                chosen_input.section.content.clone()
            };

            // Sources: chosen document first, then the other contributors.
            let mut sources = vec![chosen_input.document.id.clone()];
            for &m in members {
                let id = &inputs[m].document.id;
                if !sources.contains(id) {
                    sources.push(id.clone());
                }
            }

            let entry = provenance.entry(header.clone()).or_default();
            for id in &sources {
                if !entry.contains(id) {
                    entry.push(id.clone());
                }
            }

            merged_sections.push(MergedSection {
                header,
                body,
                sources,
                annotations,
            });
        }

        let cross_document_clusters = cluster_views
            .iter()
            .filter(|c| c.is_cross_document())
            .count();
        let statistics = ConsolidationStatistics {
            source_documents: count_documents(inputs),
            sections_considered: inputs.len(),
            clusters_formed: cluster_views.len(),
            cross_document_clusters,
            conflicts_detected: conflicts_resolved.len() + conflicts_pending.len(),
            conflicts_resolved: conflicts_resolved.len(),
            conflicts_pending: conflicts_pending.len(),
        };

        MergeOutcome {
            merged_sections,
            provenance,
            clusters: cluster_views,
            conflicts_resolved,
            conflicts_pending,
            statistics,
        }
    }
}

/// Picks the cluster member the strategy selects.
fn choose_representative(
    inputs: &[SectionForMerge],
    members: &[usize],
    strategy: MergeStrategy,
) -> usize {
    let first = members.first().copied().unwrap_or(0);
    match strategy {
        MergeStrategy::Smart => members
            .iter()
            .copied()
            .max_by(|&a, &b| {
                mean_claim_confidence(&inputs[a])
                    .partial_cmp(&mean_claim_confidence(&inputs[b]))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        inputs[a]
                            .document
                            .authority_level
                            .cmp(&inputs[b].document.authority_level)
                    })
                    .then_with(|| inputs[a].document.modified_at.cmp(&inputs[b].document.modified_at))
            })
            .unwrap_or(first),
        MergeStrategy::NewestWins => members
            .iter()
            .copied()
            .max_by(|&a, &b| {
                inputs[a]
                    .document
                    .modified_at
                    .cmp(&inputs[b].document.modified_at)
                    .then_with(|| {
                        inputs[a]
                            .document
                            .authority_level
                            .cmp(&inputs[b].document.authority_level)
                    })
            })
            .unwrap_or(first),
        // authority_wins and merge_all (which only needs a representative
        // for ordering) both rank by authority, ties broken by recency.
        MergeStrategy::AuthorityWins | MergeStrategy::MergeAll => members
            .iter()
            .copied()
            .max_by(|&a, &b| {
                inputs[a]
                    .document
                    .authority_level
                    .cmp(&inputs[b].document.authority_level)
                    .then_with(|| inputs[a].document.modified_at.cmp(&inputs[b].document.modified_at))
            })
            .unwrap_or(first),
    }
}

fn mean_claim_confidence(input: &SectionForMerge) -> f32 {
    if input.claims.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = input.claims.len() as f32;
    input.claims.iter().map(|c| c.confidence).sum::<f32>() / n
}

/// Header of the most central member: the one with the highest total
/// similarity to the rest (first member when vectors are missing).
fn central_header(inputs: &[SectionForMerge], members: &[usize]) -> String {
    if members.len() < 2 {
        return members
            .first()
            .map(|&m| inputs[m].section.header.clone())
            .unwrap_or_default();
    }
    let mut best = members[0];
    let mut best_total = f32::MIN;
    for &i in members {
        let Some(vi) = inputs[i].vector.as_deref() else {
            continue;
        };
        let total: f32 = members
            .iter()
            .filter(|&&j| j != i)
            .filter_map(|&j| inputs[j].vector.as_deref().map(|vj| crate::embedding::dot(vi, vj)))
            .sum();
        if total > best_total {
            best_total = total;
            best = i;
        }
    }
    inputs[best].section.header.clone()
}

fn count_documents(inputs: &[SectionForMerge]) -> usize {
    let mut seen: Vec<&DocumentId> = Vec::new();
    for input in inputs {
        if !seen.contains(&&input.document.id) {
            seen.push(&input.document.id);
        }
    }
    seen.len()
}
