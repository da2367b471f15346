//! Claim types.

use super::{DocumentId, SectionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a claim (canonical UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(String);

impl ClaimId {
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

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ClaimId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClaimId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An atomic subject/predicate/object statement extracted from a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Unique identifier.
    pub id: ClaimId,
    /// Owning document.
    pub document_id: DocumentId,
    /// Owning section.
    pub section_id: SectionId,
    /// Claim subject.
    pub subject: String,
    /// Claim predicate.
    pub predicate: String,
    /// Claim object.
    pub object: String,
    /// Optional scope qualifier (e.g. "on Linux", "since v2").
    pub qualifier: Option<String>,
    /// Extraction confidence on [0, 1].
    pub confidence: f32,
    /// Best-effort character span within the section content (start
    /// inclusive, end exclusive). `None` when the source text could not be
    /// located.
    pub source_span: Option<(usize, usize)>,
}

impl Claim {
    /// Returns the claim rendered as a single sentence-like string,
    /// used for embedding and for dedup comparisons.
    #[must_use]
    pub fn statement(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{} {} {} ({q})", self.subject, self.predicate, self.object),
            None => format!("{} {} {}", self.subject, self.predicate, self.object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(qualifier: Option<&str>) -> Claim {
        Claim {
            id: ClaimId::generate(),
            document_id: DocumentId::generate(),
            section_id: SectionId::generate(),
            subject: "access tokens".to_string(),
            predicate: "expire after".to_string(),
            object: "1 hour".to_string(),
            qualifier: qualifier.map(String::from),
            confidence: 0.9,
            source_span: Some((0, 36)),
        }
    }

    #[test]
    fn test_statement_without_qualifier() {
        assert_eq!(claim(None).statement(), "access tokens expire after 1 hour");
    }

    #[test]
    fn test_statement_with_qualifier() {
        assert_eq!(
            claim(Some("production")).statement(),
            "access tokens expire after 1 hour (production)"
        );
    }
}
