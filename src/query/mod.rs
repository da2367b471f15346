//! Authoritative query engine (`get_source_of_truth`).
//!
//! Vector retrieval over section embeddings, per-source relevance
//! ranking, optional self-consistency claim verification, LLM answer
//! synthesis with citation instructions, and conflict surfacing across
//! the chosen sections' claims.

use crate::llm::GenerateOptions;
use crate::models::{Claim, ConflictPair, DocumentId, SectionId, VectorOwner};
use crate::services::ServiceContainer;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use tracing::instrument;

/// Number of claims verified per query at most; verification is N LLM
/// calls per claim.
const MAX_VERIFIED_CLAIMS: usize = 12;

/// Parameters for one query.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    /// The natural-language question.
    pub query: String,
    /// Free-form query category; recorded in traces only.
    pub query_type: Option<String>,
    /// Scope entries: ids, `tag:` filters, or title globs.
    pub scope: Vec<String>,
    /// Maximum source documents (default 5).
    pub max_sources: Option<usize>,
    /// Verify supporting claims with self-consistency (default false).
    pub verify_claims: Option<bool>,
    /// Include deprecated/archived documents (default false).
    pub include_deprecated: Option<bool>,
}

/// One source document backing the answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    /// Document id.
    pub document_id: DocumentId,
    /// Document title.
    pub title: String,
    /// Relevance: max section similarity plus a small bonus for multiple
    /// contributing sections.
    pub relevance: f32,
    /// Headers of the sections that matched.
    pub matched_sections: Vec<String>,
}

/// A claim supporting the answer, with its verification result when
/// verification ran.
#[derive(Debug, Clone, Serialize)]
pub struct SupportingClaim {
    /// The claim.
    pub claim: Claim,
    /// Self-consistency confidence that the claim is supported, when
    /// verification ran.
    pub verification_confidence: Option<f32>,
}

/// The answer to a query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnswer {
    /// Synthesized answer ("" when nothing matched).
    pub answer: String,
    /// Overall confidence on [0, 1].
    pub confidence: f32,
    /// Ranked source documents.
    pub sources: Vec<SourceRef>,
    /// Claims inside the chosen sections.
    pub supporting_claims: Vec<SupportingClaim>,
    /// Conflicts among the supporting claims.
    pub conflicting_claims: Vec<ConflictPair>,
    /// Unresolved questions (the query itself when nothing matched).
    pub knowledge_gaps: Vec<String>,
    /// Degradation warnings.
    pub warnings: Vec<String>,
}

impl QueryAnswer {
    fn empty(query: &str, warnings: Vec<String>) -> Self {
        Self {
            answer: String::new(),
            confidence: 0.0,
            sources: Vec::new(),
            supporting_claims: Vec::new(),
            conflicting_claims: Vec::new(),
            knowledge_gaps: vec![query.to_string()],
            warnings,
        }
    }
}

impl ServiceContainer {
    /// Answers a natural-language query from the stored documents.
    #[instrument(skip(self, request), fields(query_type = request.query_type.as_deref().unwrap_or("default")))]
    pub fn get_source_of_truth(&self, request: QueryRequest) -> Result<QueryAnswer> {
        if request.query.trim().is_empty() {
            return Err(Error::Validation("query: must not be empty".to_string()));
        }
        let include_deprecated = request.include_deprecated.unwrap_or(false);
        let max_sources = request
            .max_sources
            .unwrap_or(self.config().query.max_sources)
            .clamp(1, 50);

        let scope_ids = if request.scope.is_empty() {
            None
        } else {
            let resolved = self
                .store()
                .resolve_scope(&request.scope, include_deprecated)?;
            if resolved.is_empty() {
                return Ok(QueryAnswer::empty(&request.query, Vec::new()));
            }
            Some(resolved)
        };

        // 1. Embed the query and retrieve candidate sections.
        let query_vector = match self.embedding().encode_one(&request.query) {
            Ok(vector) => vector,
            Err(e) => {
                return Ok(QueryAnswer::empty(
                    &request.query,
                    vec![format!("vector retrieval unavailable: {e}")],
                ));
            },
        };
        let hits = self.store().search_vectors(
            VectorOwner::Section,
            &query_vector,
            scope_ids.as_deref(),
            include_deprecated,
            max_sources * 4,
        )?;
        if hits.is_empty() {
            return Ok(QueryAnswer::empty(&request.query, Vec::new()));
        }

        let similarity: HashMap<&str, f32> =
            hits.iter().map(|(id, s)| (id.as_str(), *s)).collect();
        let section_ids: Vec<SectionId> = hits
            .iter()
            .map(|(id, _)| SectionId::from(id.as_str()))
            .collect();
        let sections = self.store().sections_by_ids(&section_ids)?;

        // 2. Group by document and rank.
        let mut per_document: HashMap<DocumentId, (f32, Vec<String>)> = HashMap::new();
        for section in &sections {
            let sim = similarity
                .get(section.id.as_str())
                .copied()
                .unwrap_or_default();
            let entry = per_document
                .entry(section.document_id.clone())
                .or_insert((0.0, Vec::new()));
            entry.0 = entry.0.max(sim);
            entry.1.push(section.header.clone());
        }
        let mut ranked: Vec<SourceRef> = Vec::new();
        for (document_id, (max_sim, headers)) in per_document {
            let Some(document) = self.store().get_document(&document_id)? else {
                continue;
            };
            #[allow(clippy::cast_precision_loss)]
            let bonus = 0.05 * (headers.len().saturating_sub(1).min(3) as f32);
            ranked.push(SourceRef {
                document_id,
                title: document.title,
                relevance: (max_sim + bonus).clamp(0.0, 1.0),
                matched_sections: headers,
            });
        }
        ranked.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(max_sources);

        let chosen_documents: Vec<&DocumentId> =
            ranked.iter().map(|s| &s.document_id).collect();
        let chosen_sections: Vec<_> = sections
            .iter()
            .filter(|s| chosen_documents.contains(&&s.document_id))
            .collect();

        // 3. Collect and optionally verify the supporting claims.
        let mut warnings = Vec::new();
        let mut claims: Vec<Claim> = Vec::new();
        for section in &chosen_sections {
            claims.extend(self.store().claims_for_section(&section.id)?);
        }
        let verify = request.verify_claims.unwrap_or(false);
        let mut supporting_claims = Vec::with_capacity(claims.len());
        for (i, claim) in claims.iter().enumerate() {
            let verification_confidence = if verify && i < MAX_VERIFIED_CLAIMS {
                match self.verify_claim(claim, &chosen_sections) {
                    Ok(confidence) => Some(confidence),
                    Err(e) => {
                        warnings.push(format!("claim verification skipped: {e}"));
                        None
                    },
                }
            } else {
                None
            };
            supporting_claims.push(SupportingClaim {
                claim: claim.clone(),
                verification_confidence,
            });
        }

        // 4. Synthesize the answer, degrading to a stitched extract when
        // the LLM is unavailable.
        let (answer, synthesis_ok) = self.synthesize(&request.query, &chosen_sections);
        if !synthesis_ok {
            warnings.push("answer synthesis degraded: llm unavailable".to_string());
        }

        // 5. Surface conflicts among the supporting claims.
        let claim_ids: Vec<String> = claims.iter().map(|c| c.id.as_str().to_string()).collect();
        let claim_vectors = self
            .store()
            .vectors_for_owners(VectorOwner::Claim, &claim_ids)?;
        let conflicting_claims = self.detector().detect_all(&claims, &claim_vectors);

        // 6. Overall confidence.
        let top_similarity = hits.first().map_or(0.0, |(_, s)| *s).clamp(0.0, 1.0);
        #[allow(clippy::cast_precision_loss)]
        let corroboration = (ranked.len() as f32 / 3.0).min(1.0);
        let verified: Vec<f32> = supporting_claims
            .iter()
            .filter_map(|c| c.verification_confidence)
            .collect();
        #[allow(clippy::cast_precision_loss)]
        let mut confidence = if verified.is_empty() {
            (0.5 * top_similarity + 0.2 * corroboration) / 0.7
        } else {
            let mean = verified.iter().sum::<f32>() / verified.len() as f32;
            0.5 * top_similarity + 0.2 * corroboration + 0.3 * mean
        };
        if !synthesis_ok {
            confidence *= 0.5;
        }
        if !conflicting_claims.is_empty() {
            confidence = confidence.min(0.95);
        }

        Ok(QueryAnswer {
            answer,
            confidence: confidence.clamp(0.0, 1.0),
            sources: ranked,
            supporting_claims,
            conflicting_claims,
            knowledge_gaps: Vec::new(),
            warnings,
        })
    }

    /// Verifies one claim against the chosen sections with
    /// self-consistency voting.
    fn verify_claim(
        &self,
        claim: &Claim,
        sections: &[&crate::models::Section],
    ) -> Result<f32> {
        let context: String = sections
            .iter()
            .filter(|s| s.id == claim.section_id)
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Context:\n{context}\n\nClaim: {}\n\nIs the claim supported by the context? \
             Answer 'yes' or 'no'.",
            claim.statement()
        );
        let consistency = self
            .llm()
            .self_consistency(&prompt, self.config().query.verification_samples)?;
        let supported = consistency.answer.to_lowercase().contains("yes");
        Ok(if supported { consistency.confidence } else { 0.0 })
    }

    /// Prompts the LLM with the chosen sections; on failure stitches the
    /// top sections into a best-effort extract.
    fn synthesize(&self, query: &str, sections: &[&crate::models::Section]) -> (String, bool) {
        let mut context = String::new();
        for section in sections.iter().take(8) {
            let snippet: String = section.content.chars().take(1200).collect();
            context.push_str(&format!(
                "[source {}] {}\n{snippet}\n\n",
                section.document_id, section.header
            ));
        }
        let prompt = format!(
            "Answer the question using only the sources below. Cite the source id that backs \
             each sentence in square brackets.\n\n{context}Question: {query}\n\nAnswer:"
        );

        match self.llm().generate(&prompt, &GenerateOptions::default()) {
            Ok(answer) if !answer.trim().is_empty() => (answer.trim().to_string(), true),
            Ok(_) => (stitched_answer(sections), false),
            Err(e) => {
                tracing::warn!(error = %e, "answer synthesis failed");
                (stitched_answer(sections), false)
            },
        }
    }
}

/// Best-effort answer assembled from the top sections verbatim.
fn stitched_answer(sections: &[&crate::models::Section]) -> String {
    sections
        .iter()
        .take(3)
        .map(|s| {
            let snippet: String = s.content.chars().take(400).collect();
            format!("{}: {snippet}", s.header)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
