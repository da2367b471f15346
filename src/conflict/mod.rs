//! Conflict detection between claims.
//!
//! Combines independent signals (semantic opposition, value divergence,
//! temporal divergence, scope divergence, and, only when the heuristics
//! are inconclusive, LLM adjudication) into a classified
//! [`ConflictPair`]. The reported type comes from the strongest signal,
//! ties broken by the [`ConflictType`] declaration order; the overall
//! strength is the maximum signal strength clipped to [0, 1]. Pairs below
//! the configured minimum strength are dropped.

mod signals;

pub use signals::{
    NumericValue, extract_numeric, numeric_divergence, predicates_negate, quoted_divergence,
    scope_divergence, temporal_divergence,
};

use crate::config::ConflictConfig;
use crate::embedding::dot;
use crate::llm::LlmPipeline;
use crate::models::{Claim, ConflictEvidence, ConflictPair, ConflictType};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Multi-signal conflict detector.
pub struct ConflictDetector {
    config: ConflictConfig,
    /// Adjudicator for pairs the heuristics cannot decide. Optional: when
    /// absent or failing, the LLM signal is skipped.
    llm: Option<Arc<LlmPipeline>>,
}

#[derive(Debug, Deserialize)]
struct Adjudication {
    verdict: String,
    #[serde(default)]
    confidence: f32,
}

impl ConflictDetector {
    /// Creates a detector.
    #[must_use]
    pub fn new(config: ConflictConfig, llm: Option<Arc<LlmPipeline>>) -> Self {
        Self { config, llm }
    }

    /// Detects a conflict between two claims, given their vectors when
    /// available.
    ///
    /// Returns `None` when the claims are unrelated or every signal stays
    /// below the minimum strength.
    #[must_use]
    pub fn detect(
        &self,
        claim_a: &Claim,
        vector_a: Option<&[f32]>,
        claim_b: &Claim,
        vector_b: Option<&[f32]>,
    ) -> Option<ConflictPair> {
        let similarity = match (vector_a, vector_b) {
            (Some(a), Some(b)) if a.len() == b.len() => Some(dot(a, b)),
            _ => None,
        };
        let related = self.claims_related(claim_a, claim_b, similarity);
        if !related {
            return None;
        }

        let mut evidence: Vec<ConflictEvidence> = Vec::new();

        // Semantic opposition: high similarity plus a negation cue.
        let semantically_close =
            similarity.is_some_and(|s| s >= self.config.semantic_threshold);
        if semantically_close || similarity.is_none() {
            let negation = predicates_negate(&claim_a.predicate, &claim_b.predicate).or_else(|| {
                predicates_negate(
                    &format!("{} {}", claim_a.predicate, claim_a.object),
                    &format!("{} {}", claim_b.predicate, claim_b.object),
                )
            });
            if let Some(note) = negation {
                let strength = similarity.unwrap_or(self.config.semantic_threshold);
                evidence.push(ConflictEvidence {
                    signal: ConflictType::DirectNegation,
                    strength: strength.clamp(0.0, 1.0),
                    note,
                });
            }
        }

        // Value and temporal divergence need the same subject/predicate.
        if subjects_similar(claim_a, claim_b) && predicates_similar(claim_a, claim_b) {
            if let Some((strength, note)) =
                numeric_divergence(&claim_a.object, &claim_b.object)
            {
                evidence.push(ConflictEvidence {
                    signal: ConflictType::ValueConflict,
                    strength,
                    note,
                });
            }
            if let Some((strength, note)) = quoted_divergence(&claim_a.object, &claim_b.object) {
                evidence.push(ConflictEvidence {
                    signal: ConflictType::ValueConflict,
                    strength,
                    note,
                });
            }
            if let Some((strength, note)) =
                temporal_divergence(&claim_a.object, &claim_b.object)
            {
                evidence.push(ConflictEvidence {
                    signal: ConflictType::TemporalConflict,
                    strength,
                    note,
                });
            }
        }

        if subjects_similar(claim_a, claim_b) {
            if let Some((strength, note)) =
                scope_divergence(claim_a.qualifier.as_deref(), claim_b.qualifier.as_deref())
            {
                evidence.push(ConflictEvidence {
                    signal: ConflictType::ScopeConflict,
                    strength,
                    note,
                });
            }
        }

        // LLM adjudication only when the heuristics are inconclusive.
        let heuristic_max = max_strength(&evidence);
        if heuristic_max < self.config.min_strength {
            if let Some(adjudicated) = self.adjudicate(claim_a, claim_b) {
                evidence.push(adjudicated);
            }
        }

        let strength = max_strength(&evidence).clamp(0.0, 1.0);
        if strength < self.config.min_strength {
            return None;
        }

        let conflict_type = classify(&evidence, strength)?;
        Some(ConflictPair {
            conflict_type,
            strength,
            claim_a: claim_a.clone(),
            claim_b: claim_b.clone(),
            evidence,
        })
    }

    /// Runs pairwise detection over a claim set, comparing only claims
    /// from different documents. `vectors` maps claim id → vector.
    #[must_use]
    pub fn detect_all(
        &self,
        claims: &[Claim],
        vectors: &HashMap<String, Vec<f32>>,
    ) -> Vec<ConflictPair> {
        let mut pairs = Vec::new();
        for (i, a) in claims.iter().enumerate() {
            for b in claims.iter().skip(i + 1) {
                if a.document_id == b.document_id {
                    continue;
                }
                let va = vectors.get(a.id.as_str()).map(Vec::as_slice);
                let vb = vectors.get(b.id.as_str()).map(Vec::as_slice);
                if let Some(pair) = self.detect(a, va, b, vb) {
                    pairs.push(pair);
                }
            }
        }
        pairs.sort_by(|x, y| {
            y.strength
                .partial_cmp(&x.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pairs
    }

    /// Pre-gate: are the two claims even about the same thing?
    fn claims_related(&self, a: &Claim, b: &Claim, similarity: Option<f32>) -> bool {
        if similarity.is_some_and(|s| s >= self.config.semantic_threshold) {
            return true;
        }
        subjects_similar(a, b)
    }

    fn adjudicate(&self, a: &Claim, b: &Claim) -> Option<ConflictEvidence> {
        let llm = self.llm.as_ref()?;
        let prompt = format!(
            "Claim A: {}\nClaim B: {}\n\nDo these claims contradict each other? Answer with \
             the verdict 'contradicts', 'agrees', or 'unrelated' and a confidence in [0,1].",
            a.statement(),
            b.statement()
        );
        let result: Adjudication = match llm.extract_structured_as(
            &prompt,
            r#"{"verdict": "contradicts|agrees|unrelated", "confidence": 0.0}"#,
        ) {
            Ok(result) => result,
            Err(e) => {
                // Adjudication is advisory; skip the signal on failure.
                tracing::debug!(error = %e, "llm adjudication skipped");
                return None;
            },
        };

        if result.verdict.trim().eq_ignore_ascii_case("contradicts") {
            Some(ConflictEvidence {
                signal: ConflictType::ImplicationConflict,
                strength: result.confidence.clamp(0.0, 1.0),
                note: "llm adjudicated contradiction".to_string(),
            })
        } else {
            None
        }
    }
}

fn max_strength(evidence: &[ConflictEvidence]) -> f32 {
    evidence.iter().map(|e| e.strength).fold(0.0, f32::max)
}

/// Picks the reported type: the strongest signal, ties broken by the
/// declared priority order.
fn classify(evidence: &[ConflictEvidence], strength: f32) -> Option<ConflictType> {
    evidence
        .iter()
        .filter(|e| (e.strength - strength).abs() < 1e-6)
        .map(|e| e.signal)
        .min()
}

fn subjects_similar(a: &Claim, b: &Claim) -> bool {
    let x = normalize(&a.subject);
    let y = normalize(&b.subject);
    x == y || x.contains(&y) || y.contains(&x) || strsim::normalized_levenshtein(&x, &y) >= 0.6
}

fn predicates_similar(a: &Claim, b: &Claim) -> bool {
    let x = normalize(&a.predicate);
    let y = normalize(&b.predicate);
    x == y || x.contains(&y) || y.contains(&x) || strsim::normalized_levenshtein(&x, &y) >= 0.6
}

fn normalize(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DoctrineConfig;
    use crate::models::{ClaimId, DocumentId, SectionId};

    fn claim(subject: &str, predicate: &str, object: &str) -> Claim {
        Claim {
            id: ClaimId::generate(),
            document_id: DocumentId::generate(),
            section_id: SectionId::generate(),
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.to_string(),
            qualifier: None,
            confidence: 0.9,
            source_span: None,
        }
    }

    fn detector() -> ConflictDetector {
        ConflictDetector::new(DoctrineConfig::default().conflict, None)
    }

    #[test]
    fn test_value_conflict_detected() {
        let a = claim("access tokens", "expire after", "1 hour");
        let b = claim("access tokens", "expire after", "2 hours");
        let pair = detector().detect(&a, None, &b, None).unwrap();
        assert_eq!(pair.conflict_type, ConflictType::ValueConflict);
        assert!(pair.strength > 0.5);
        assert!(!pair.evidence.is_empty());
    }

    #[test]
    fn test_agreement_is_not_conflict() {
        let a = claim("access tokens", "expire after", "1 hour");
        let b = claim("access tokens", "expire after", "60 minutes");
        assert!(detector().detect(&a, None, &b, None).is_none());
    }

    #[test]
    fn test_direct_negation() {
        let a = claim("mfa", "is", "required");
        let b = claim("mfa", "is not", "required");
        let pair = detector().detect(&a, None, &b, None).unwrap();
        assert_eq!(pair.conflict_type, ConflictType::DirectNegation);
    }

    #[test]
    fn test_unrelated_claims_skipped() {
        let a = claim("access tokens", "expire after", "1 hour");
        let b = claim("database backups", "run", "nightly");
        assert!(detector().detect(&a, None, &b, None).is_none());
    }

    #[test]
    fn test_temporal_conflict() {
        let a = claim("policy", "takes effect on", "2024-01-01");
        let b = claim("policy", "takes effect on", "2024-06-01");
        let pair = detector().detect(&a, None, &b, None).unwrap();
        assert_eq!(pair.conflict_type, ConflictType::TemporalConflict);
    }

    #[test]
    fn test_scope_conflict() {
        let mut a = claim("file watching", "uses", "inotify");
        a.qualifier = Some("on Linux".to_string());
        let mut b = claim("file watching", "uses", "inotify");
        b.qualifier = Some("on Windows".to_string());
        let pair = detector().detect(&a, None, &b, None).unwrap();
        assert_eq!(pair.conflict_type, ConflictType::ScopeConflict);
    }

    #[test]
    fn test_detect_all_skips_same_document() {
        let mut a = claim("tokens", "expire after", "1 hour");
        let mut b = claim("tokens", "expire after", "2 hours");
        let shared = DocumentId::generate();
        a.document_id = shared.clone();
        b.document_id = shared;
        let pairs = detector().detect_all(&[a, b], &HashMap::new());
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_detect_all_orders_by_strength() {
        let a = claim("tokens", "expire after", "1 hour");
        let b = claim("tokens", "expire after", "10 hours");
        let c = claim("sessions", "last", "24 hours");
        let d = claim("sessions", "last", "23 hours");
        let pairs = detector().detect_all(&[a, b, c, d], &HashMap::new());
        assert!(!pairs.is_empty());
        for window in pairs.windows(2) {
            assert!(window[0].strength >= window[1].strength);
        }
    }
}
