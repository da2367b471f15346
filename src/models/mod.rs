//! Data models for doctrine.
//!
//! This module contains all the core data structures used throughout the
//! system: persisted entities (documents, sections, claims, vectors,
//! supersessions) and the computed structures produced by the conflict
//! detector and merge engine.

mod claim;
mod conflict;
mod consolidation;
mod document;

pub use claim::{Claim, ClaimId};
pub use conflict::{ConflictEvidence, ConflictPair, ConflictType};
pub use consolidation::{
    ConsolidationStatistics, MergeStrategy, OutputFormat, OverlapCluster, ProvenanceMap,
    Supersession,
};
pub use document::{
    Document, DocumentId, DocumentStatus, DocumentType, Section, SectionId, VectorOwner,
};
