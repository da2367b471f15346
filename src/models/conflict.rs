//! Conflict classification types.

use super::Claim;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a detected conflict between two claims.
///
/// The declaration order is the tie-break order when two signals report
/// equal strength: earlier variants win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// One claim negates the other outright.
    DirectNegation,
    /// Numeric or quoted literal values disagree.
    ValueConflict,
    /// Dates on the same subject/predicate differ.
    TemporalConflict,
    /// Qualifiers carry incompatible scopes.
    ScopeConflict,
    /// The claims contradict by implication (LLM adjudicated).
    ImplicationConflict,
}

impl ConflictType {
    /// Returns the type as a string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DirectNegation => "direct_negation",
            Self::ValueConflict => "value_conflict",
            Self::TemporalConflict => "temporal_conflict",
            Self::ScopeConflict => "scope_conflict",
            Self::ImplicationConflict => "implication_conflict",
        }
    }

    /// Parses a conflict type from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct_negation" => Some(Self::DirectNegation),
            "value_conflict" => Some(Self::ValueConflict),
            "temporal_conflict" => Some(Self::TemporalConflict),
            "scope_conflict" => Some(Self::ScopeConflict),
            "implication_conflict" => Some(Self::ImplicationConflict),
            _ => None,
        }
    }
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evidence contributed by one conflict signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEvidence {
    /// The signal that produced this evidence.
    pub signal: ConflictType,
    /// Signal strength on [0, 1].
    pub strength: f32,
    /// Human-readable note describing what the signal saw.
    pub note: String,
}

/// Two claims classified as conflicting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictPair {
    /// Classification, taken from the strongest signal.
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    /// Overall strength: the maximum signal strength, clipped to [0, 1].
    pub strength: f32,
    /// First claim.
    pub claim_a: Claim,
    /// Second claim.
    pub claim_b: Claim,
    /// All evidence gathered, one entry per signal that fired.
    pub evidence: Vec<ConflictEvidence>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_break_order() {
        // Declaration order doubles as tie-break priority.
        assert!(ConflictType::DirectNegation < ConflictType::ValueConflict);
        assert!(ConflictType::ValueConflict < ConflictType::TemporalConflict);
        assert!(ConflictType::TemporalConflict < ConflictType::ScopeConflict);
        assert!(ConflictType::ScopeConflict < ConflictType::ImplicationConflict);
    }

    #[test]
    fn test_conflict_type_roundtrip() {
        for ct in [
            ConflictType::DirectNegation,
            ConflictType::ValueConflict,
            ConflictType::TemporalConflict,
            ConflictType::ScopeConflict,
            ConflictType::ImplicationConflict,
        ] {
            assert_eq!(ConflictType::parse(ct.as_str()), Some(ct));
        }
    }
}
