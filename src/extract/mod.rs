//! Claim extraction.
//!
//! Prompts the LLM pipeline with section content and a schema requesting
//! atomic (subject, predicate, object, qualifier, confidence) triples,
//! then filters, deduplicates, and anchors the results to the section
//! text. Individual section failures contribute zero claims and a warning
//! rather than failing the whole document.

use crate::config::ExtractionConfig;
use crate::llm::LlmPipeline;
use crate::models::{Claim, ClaimId, Section};
use crate::Result;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const CLAIM_SCHEMA_HINT: &str = r#"{"claims": [{"subject": "string", "predicate": "string", "object": "string", "qualifier": "string or null", "confidence": 0.0}]}"#;

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    claims: Vec<RawClaim>,
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    predicate: String,
    #[serde(default)]
    object: String,
    #[serde(default)]
    qualifier: Option<String>,
    #[serde(default = "default_confidence")]
    confidence: f32,
}

const fn default_confidence() -> f32 {
    0.5
}

/// Outcome of extracting over a batch of sections.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// All claims extracted, in section order.
    pub claims: Vec<Claim>,
    /// Per-section failures, as human-readable warnings.
    pub warnings: Vec<String>,
}

/// LLM-driven claim extractor.
pub struct ClaimExtractor {
    llm: Arc<LlmPipeline>,
    config: ExtractionConfig,
}

impl ClaimExtractor {
    /// Creates an extractor over the given LLM pipeline.
    #[must_use]
    pub fn new(llm: Arc<LlmPipeline>, config: ExtractionConfig) -> Self {
        Self { llm, config }
    }

    /// Extracts claims from one section.
    ///
    /// # Errors
    ///
    /// Propagates LLM and structured-extraction failures; the caller
    /// decides whether they fail the document or only the section.
    pub fn extract(&self, section: &Section) -> Result<Vec<Claim>> {
        if section.content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let prompt = format!(
            "Extract the atomic factual claims from the following text. Each claim is one \
             subject/predicate/object triple with an optional qualifier (a scope such as an \
             operating system, environment, or version) and a confidence between 0.0 and 1.0.\n\
             \nSection \"{}\":\n{}",
            section.header, section.content
        );
        let raw: RawClaims = self
            .llm
            .extract_structured_as(&prompt, CLAIM_SCHEMA_HINT)?;

        Ok(self.post_process(section, raw.claims))
    }

    /// Extracts claims for many sections with bounded concurrency.
    ///
    /// A failing section is logged, contributes zero claims, and adds a
    /// warning; extraction of the remaining sections continues.
    pub fn extract_batch(&self, sections: &[Section]) -> ExtractionOutcome {
        let workers = self.config.concurrency.clamp(1, sections.len().max(1));
        let next = AtomicUsize::new(0);
        let slots: Mutex<Vec<Vec<Claim>>> = Mutex::new(vec![Vec::new(); sections.len()]);
        let warnings: Mutex<Vec<String>> = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(section) = sections.get(i) else {
                            break;
                        };
                        match self.extract(section) {
                            Ok(claims) => {
                                if let Ok(mut slots) = slots.lock() {
                                    slots[i] = claims;
                                }
                            },
                            Err(e) => {
                                tracing::warn!(
                                    section = %section.header,
                                    error = %e,
                                    "claim extraction failed for section"
                                );
                                if let Ok(mut warnings) = warnings.lock() {
                                    warnings.push(format!(
                                        "claim extraction failed for section '{}': {e}",
                                        section.header
                                    ));
                                }
                            },
                        }
                    }
                });
            }
        });

        let claims = slots
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .into_iter()
            .flatten()
            .collect();
        ExtractionOutcome {
            claims,
            warnings: warnings
                .into_inner()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        }
    }

    /// Filters, deduplicates, and anchors raw triples.
    fn post_process(&self, section: &Section, raw: Vec<RawClaim>) -> Vec<Claim> {
        let mut kept: Vec<Claim> = Vec::new();
        let mut kept_keys: Vec<String> = Vec::new();

        for candidate in raw {
            let subject = candidate.subject.trim();
            let predicate = candidate.predicate.trim();
            let object = candidate.object.trim();
            if subject.is_empty() || predicate.is_empty() {
                continue;
            }
            let confidence = candidate.confidence.clamp(0.0, 1.0);
            if confidence < self.config.min_confidence {
                continue;
            }

            let key = normalize_for_dedup(&format!("{subject} {predicate} {object}"));
            let duplicate = kept_keys
                .iter()
                .any(|existing| strsim::levenshtein(existing, &key) <= self.config.dedup_distance);
            if duplicate {
                continue;
            }

            kept.push(Claim {
                id: ClaimId::generate(),
                document_id: section.document_id.clone(),
                section_id: section.id.clone(),
                subject: subject.to_string(),
                predicate: predicate.to_string(),
                object: object.to_string(),
                qualifier: candidate
                    .qualifier
                    .as_deref()
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(String::from),
                confidence,
                source_span: find_span(&section.content, subject, object),
            });
            kept_keys.push(key);
        }
        kept
    }
}

/// Normalizes a claim string for Levenshtein dedup: lowercase with
/// collapsed whitespace.
fn normalize_for_dedup(s: &str) -> String {
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort span attachment: locates the object (preferred, it is the
/// most distinctive part) or the subject inside the section content.
fn find_span(content: &str, subject: &str, object: &str) -> Option<(usize, usize)> {
    for needle in [object, subject] {
        if needle.is_empty() {
            continue;
        }
        if let Some(start) = content.find(needle) {
            return Some((start, start + needle.len()));
        }
        let lowered = content.to_lowercase();
        if let Some(start) = lowered.find(&needle.to_lowercase()) {
            return Some((start, start + needle.len()));
        }
    }
    None
}
