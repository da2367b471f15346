//! Document and section types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unique identifier for a document (canonical UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps an existing id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a section (canonical UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wraps an existing id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Document type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// Formal specification.
    Spec,
    /// How-to or usage guide.
    Guide,
    /// Session or project handoff notes.
    Handoff,
    /// Prompt text for language models.
    Prompt,
    /// Generated or written report.
    #[default]
    Report,
    /// Reference material, including consolidated output.
    Reference,
    /// Recorded decision.
    Decision,
    /// Archived material kept for the record.
    Archive,
}

impl DocumentType {
    /// Returns all document type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Spec,
            Self::Guide,
            Self::Handoff,
            Self::Prompt,
            Self::Report,
            Self::Reference,
            Self::Decision,
            Self::Archive,
        ]
    }

    /// Returns the type as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Spec => "spec",
            Self::Guide => "guide",
            Self::Handoff => "handoff",
            Self::Prompt => "prompt",
            Self::Report => "report",
            Self::Reference => "reference",
            Self::Decision => "decision",
            Self::Archive => "archive",
        }
    }

    /// Parses a document type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "spec" => Some(Self::Spec),
            "guide" => Some(Self::Guide),
            "handoff" => Some(Self::Handoff),
            "prompt" => Some(Self::Prompt),
            "report" => Some(Self::Report),
            "reference" => Some(Self::Reference),
            "decision" => Some(Self::Decision),
            "archive" => Some(Self::Archive),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Document lifecycle status.
///
/// Transitions are monotonic away from `Active`: a document may move from
/// `Active` to any other status and between non-active statuses, but never
/// back to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Live and retrievable.
    #[default]
    Active,
    /// Explicitly deprecated; excluded from retrieval by default.
    Deprecated,
    /// Archived; excluded from retrieval by default.
    Archived,
    /// Replaced by a consolidated document; still retrievable.
    Superseded,
}

impl DocumentStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Archived => "archived",
            Self::Superseded => "superseded",
        }
    }

    /// Parses a status from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "deprecated" => Some(Self::Deprecated),
            "archived" => Some(Self::Archived),
            "superseded" => Some(Self::Superseded),
            _ => None,
        }
    }

    /// Returns true if the transition `self -> to` is allowed.
    ///
    /// Transitions are monotonic away from `Active`.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        to != Self::Active && self != to
    }

    /// Returns true if documents with this status are retrievable by
    /// default.
    ///
    /// Superseded documents remain visible so that queries issued after a
    /// consolidation can still cite the sources they were merged from.
    #[must_use]
    pub const fn retrievable_by_default(self) -> bool {
        matches!(self, Self::Active | Self::Superseded)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier.
    pub id: DocumentId,
    /// SHA-256 of the raw content bytes, hex encoded. Unique across the
    /// store; the serialization point for concurrent duplicate ingests.
    pub content_hash: String,
    /// Document title.
    pub title: String,
    /// Document type.
    pub document_type: DocumentType,
    /// Authority level on [1..10]; weighs into strategy-driven merges.
    pub authority_level: u8,
    /// Tag set.
    pub tags: BTreeSet<String>,
    /// Lifecycle status.
    pub status: DocumentStatus,
    /// Raw content as ingested.
    pub raw_content: String,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// Last modification timestamp (Unix epoch seconds).
    pub modified_at: u64,
}

/// A contiguous, heading-delimited span of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    /// Unique identifier.
    pub id: SectionId,
    /// Owning document.
    pub document_id: DocumentId,
    /// Heading text (without the `#` markers).
    pub header: String,
    /// Heading level on [1..6].
    pub level: u8,
    /// Section body with the heading line removed.
    pub content: String,
    /// Byte range within the raw document content (start inclusive, end
    /// exclusive).
    pub byte_range: (usize, usize),
    /// Position within the document; contiguous from 0.
    pub ordinal: usize,
}

/// The kind of entity a vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorOwner {
    /// Vector embeds a section's content.
    Section,
    /// Vector embeds a claim's subject/predicate/object text.
    Claim,
}

impl VectorOwner {
    /// Returns the owner kind as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Section => "section",
            Self::Claim => "claim",
        }
    }

    /// Parses an owner kind from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "section" => Some(Self::Section),
            "claim" => Some(Self::Claim),
            _ => None,
        }
    }
}

impl fmt::Display for VectorOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_canonical_uuid() {
        let id = DocumentId::generate();
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 4);
        assert_eq!(parts[3].len(), 4);
        assert_eq!(parts[4].len(), 12);
    }

    #[test]
    fn test_document_type_roundtrip() {
        for dt in DocumentType::all() {
            assert_eq!(DocumentType::parse(dt.as_str()), Some(*dt));
        }
        assert_eq!(DocumentType::parse("novel"), None);
    }

    #[test]
    fn test_status_transitions_monotonic() {
        assert!(DocumentStatus::Active.can_transition_to(DocumentStatus::Deprecated));
        assert!(DocumentStatus::Active.can_transition_to(DocumentStatus::Superseded));
        assert!(DocumentStatus::Superseded.can_transition_to(DocumentStatus::Deprecated));
        assert!(!DocumentStatus::Deprecated.can_transition_to(DocumentStatus::Active));
        assert!(!DocumentStatus::Superseded.can_transition_to(DocumentStatus::Active));
    }

    #[test]
    fn test_retrievability() {
        assert!(DocumentStatus::Active.retrievable_by_default());
        assert!(DocumentStatus::Superseded.retrievable_by_default());
        assert!(!DocumentStatus::Deprecated.retrievable_by_default());
        assert!(!DocumentStatus::Archived.retrievable_by_default());
    }
}
