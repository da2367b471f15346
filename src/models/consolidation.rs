//! Consolidation types: strategies, clusters, provenance, supersessions.

use super::{DocumentId, SectionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Rule governing per-cluster section selection during consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Claim-weighted: the section whose claims have the highest mean
    /// confidence wins.
    #[default]
    Smart,
    /// The section from the most recently modified document wins.
    NewestWins,
    /// The section from the highest-authority document wins; ties broken
    /// by recency.
    AuthorityWins,
    /// Every contributing section is emitted, annotated with its origin.
    MergeAll,
}

impl MergeStrategy {
    /// Returns the strategy as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Smart => "smart",
            Self::NewestWins => "newest_wins",
            Self::AuthorityWins => "authority_wins",
            Self::MergeAll => "merge_all",
        }
    }

    /// Parses a strategy from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "smart" => Some(Self::Smart),
            "newest_wins" => Some(Self::NewestWins),
            "authority_wins" => Some(Self::AuthorityWins),
            "merge_all" => Some(Self::MergeAll),
            _ => None,
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output rendering format for consolidated documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown with a trailing Provenance subsection per section.
    #[default]
    Markdown,
    /// JSON with nested provenance.
    Json,
    /// YAML with nested provenance.
    Yaml,
}

impl OutputFormat {
    /// Returns the format as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    /// Parses a format from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "markdown" | "md" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A set of sections from different documents judged to cover the same
/// topic. Computed on demand; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlapCluster {
    /// Cluster ordinal within one overlap analysis.
    pub cluster_id: usize,
    /// Representative topic, taken from the most central member's header.
    pub topic: String,
    /// Member sections.
    pub section_ids: Vec<SectionId>,
    /// Documents contributing at least one member.
    pub document_ids: Vec<DocumentId>,
    /// Mean pairwise cosine similarity across members.
    pub mean_similarity: f32,
}

impl OverlapCluster {
    /// Returns true if the cluster spans more than one document.
    #[must_use]
    pub fn is_cross_document(&self) -> bool {
        self.document_ids.len() > 1
    }
}

/// Association from each consolidated section header to the source
/// document ids that contributed to it.
pub type ProvenanceMap = BTreeMap<String, Vec<DocumentId>>;

/// A persisted record that one document replaces another. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supersession {
    /// Unique identifier.
    pub id: String,
    /// The replaced document.
    pub old_document_id: DocumentId,
    /// The replacing document. Never equal to `old_document_id`.
    pub new_document_id: DocumentId,
    /// Why the supersession was recorded.
    pub reason: String,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
}

/// Counters reported by a consolidation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationStatistics {
    /// Documents in scope.
    pub source_documents: usize,
    /// Sections considered.
    pub sections_considered: usize,
    /// Clusters formed.
    pub clusters_formed: usize,
    /// Clusters spanning more than one document.
    pub cross_document_clusters: usize,
    /// Conflicts detected in total.
    pub conflicts_detected: usize,
    /// Conflicts resolved automatically or by strategy.
    pub conflicts_resolved: usize,
    /// Conflicts left for human review.
    pub conflicts_pending: usize,
}
