//! Document ingestion.
//!
//! Raw text → parser → transactional document+sections commit →
//! best-effort enrichment (vectors, claims, entity graph). The
//! authoritative commit either fully succeeds or the call fails;
//! enrichment failures turn into warnings and are back-filled on the next
//! ingest of the same content.

use super::ServiceContainer;
use crate::models::{
    Claim, Document, DocumentId, DocumentStatus, DocumentType, Section, SectionId, VectorOwner,
};
use crate::parser::parse_document;
use crate::{Error, Result, current_timestamp};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

/// Parameters for one ingest.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    /// Path to a local file. Exactly one of `file_path`, `content`, `url`.
    pub file_path: Option<String>,
    /// Inline content.
    pub content: Option<String>,
    /// URL to fetch (http/https only).
    pub url: Option<String>,
    /// Document type.
    pub document_type: DocumentType,
    /// Explicit title; derived from the content or source otherwise.
    pub title: Option<String>,
    /// Authority level [1..10]; defaults to 5.
    pub authority_level: Option<u8>,
    /// Tags.
    pub tags: BTreeSet<String>,
    /// Extract claims (default true).
    pub extract_claims: Option<bool>,
    /// Generate embeddings (default true).
    pub generate_embeddings: Option<bool>,
    /// Build the entity graph (default true).
    pub build_entity_graph: Option<bool>,
}

/// Result of one ingest.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// The document id (existing one on duplicate content).
    pub document_id: DocumentId,
    /// Sections now present for the document.
    pub sections_created: usize,
    /// Claims extracted in this call.
    pub claims_extracted: usize,
    /// Entities linked in this call.
    pub entities_linked: usize,
    /// Enrichment warnings.
    pub warnings: Vec<String>,
}

impl ServiceContainer {
    /// Ingests one document.
    #[instrument(skip(self, request), fields(document_type = %request.document_type))]
    pub fn ingest_document(&self, request: IngestRequest) -> Result<IngestReport> {
        let (raw_content, source_name) = load_content(&request)?;
        let parsed = parse_document(&raw_content, &source_name);
        let title = request
            .title
            .clone()
            .or_else(|| parsed.title.clone())
            .unwrap_or(source_name);

        let authority_level = match request.authority_level {
            Some(level @ 1..=10) => level,
            Some(level) => {
                return Err(Error::Validation(format!(
                    "authority_level: {level} outside [1..10]"
                )));
            },
            None => 5,
        };

        let content_hash = hex::encode(Sha256::digest(raw_content.as_bytes()));
        let now = current_timestamp();
        let document = Document {
            id: DocumentId::generate(),
            content_hash,
            title,
            document_type: request.document_type,
            authority_level,
            tags: request.tags.clone(),
            status: DocumentStatus::Active,
            raw_content: raw_content.clone(),
            created_at: now,
            modified_at: now,
        };
        let sections: Vec<Section> = parsed
            .sections
            .iter()
            .enumerate()
            .map(|(ordinal, s)| Section {
                id: SectionId::generate(),
                document_id: document.id.clone(),
                header: s.header.clone(),
                level: s.level,
                content: s.content.clone(),
                byte_range: s.byte_range,
                ordinal,
            })
            .collect();

        let mut warnings = Vec::new();
        let (document_id, sections) =
            match self.store().insert_document_with_sections(&document, &sections) {
                Ok(()) => (document.id.clone(), sections),
                Err(Error::DuplicateContent { document_id }) => {
                    // Idempotent path: update metadata in place and
                    // back-fill any missing enrichment.
                    let existing_id = DocumentId::from(document_id);
                    self.store().update_document_metadata(
                        &existing_id,
                        Some(request.document_type),
                        Some(authority_level),
                        Some(&request.tags),
                        None,
                    )?;
                    warnings.push(
                        "content already ingested; metadata updated in place".to_string(),
                    );
                    let existing_sections = self.store().sections_for_document(&existing_id)?;
                    (existing_id, existing_sections)
                },
                Err(e) => return Err(e),
            };

        metrics::counter!("doctrine_documents_ingested_total").increment(1);

        // Enrichment from here on is best-effort: the document is already
        // committed and visible.
        let mut embeddings_ok = false;
        if request.generate_embeddings.unwrap_or(true) {
            match self.embed_sections(&sections) {
                Ok(()) => embeddings_ok = true,
                Err(e) => warnings.push(format!("embeddings skipped: {e}")),
            }
        }

        let mut claims_extracted = 0;
        let mut entities_linked = 0;
        if request.extract_claims.unwrap_or(true) {
            let existing_claims = self.store().claims_for_document(&document_id)?;
            let needs_extraction = existing_claims.is_empty();
            if needs_extraction {
                let (claims, extraction_warnings) = self.extract_and_store(&sections);
                claims_extracted = claims.len();
                warnings.extend(extraction_warnings);

                if embeddings_ok && !claims.is_empty() {
                    if let Err(e) = self.embed_claims(&claims) {
                        warnings.push(format!("claim embeddings skipped: {e}"));
                    }
                }

                if request.build_entity_graph.unwrap_or(true) && self.resolver().enabled() {
                    let outcome = self.resolver().link_claims(&claims);
                    entities_linked = outcome.entities_linked;
                    warnings.extend(outcome.warnings);
                }
            }
        }

        Ok(IngestReport {
            document_id,
            sections_created: sections.len(),
            claims_extracted,
            entities_linked,
            warnings,
        })
    }

    pub(crate) fn embed_sections(&self, sections: &[Section]) -> Result<()> {
        let Some(first) = sections.first() else {
            return Ok(());
        };
        let missing_ids = self.store().sections_missing_vectors(&first.document_id)?;
        let missing: Vec<&Section> = sections
            .iter()
            .filter(|s| missing_ids.contains(&s.id))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = missing
            .iter()
            .map(|s| format!("{}\n{}", s.header, s.content))
            .collect();
        let vectors = self.embedding().encode(&texts)?;
        for (section, vector) in missing.iter().zip(vectors) {
            self.store()
                .upsert_vector(VectorOwner::Section, section.id.as_str(), &vector)?;
        }
        Ok(())
    }

    fn embed_claims(&self, claims: &[Claim]) -> Result<()> {
        let texts: Vec<String> = claims.iter().map(Claim::statement).collect();
        let vectors = self.embedding().encode(&texts)?;
        for (claim, vector) in claims.iter().zip(vectors) {
            self.store()
                .upsert_vector(VectorOwner::Claim, claim.id.as_str(), &vector)?;
        }
        Ok(())
    }

    /// Runs batched extraction and persists the claims per section.
    /// Returns the stored claims and collapsed warnings.
    fn extract_and_store(&self, sections: &[Section]) -> (Vec<Claim>, Vec<String>) {
        let outcome = self.extractor().extract_batch(sections);

        let mut warnings = Vec::new();
        if !outcome.warnings.is_empty() {
            // When every section failed the same way, one warning reads
            // better than one per section.
            if outcome.warnings.len() == sections.len() && outcome.claims.is_empty() {
                warnings.push(format!(
                    "claim extraction skipped: llm unavailable ({})",
                    outcome.warnings[0]
                ));
            } else {
                warnings.extend(outcome.warnings);
            }
        }

        let mut by_section: HashMap<SectionId, Vec<Claim>> = HashMap::new();
        for claim in &outcome.claims {
            by_section
                .entry(claim.section_id.clone())
                .or_default()
                .push(claim.clone());
        }
        let mut stored = Vec::new();
        for (section_id, claims) in by_section {
            match self.store().replace_section_claims(&section_id, &claims) {
                Ok(()) => stored.extend(claims),
                Err(e) => warnings.push(format!("claims not persisted: {e}")),
            }
        }
        (stored, warnings)
    }
}

/// Resolves the content source, enforcing the exactly-one rule, and
/// returns the raw text plus a name usable as a fallback title.
fn load_content(request: &IngestRequest) -> Result<(String, String)> {
    let provided = [
        request.file_path.is_some(),
        request.content.is_some(),
        request.url.is_some(),
    ]
    .iter()
    .filter(|p| **p)
    .count();
    if provided != 1 {
        return Err(Error::Validation(
            "exactly one of file_path, content, url is required".to_string(),
        ));
    }

    if let Some(content) = &request.content {
        return Ok((content.clone(), "Untitled".to_string()));
    }

    if let Some(path) = &request.file_path {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::NotFound(format!("file {path}: {e}")))?;
        let name = Path::new(path)
            .file_stem()
            .map_or_else(|| path.clone(), |s| s.to_string_lossy().to_string());
        return Ok((raw, name));
    }

    let url = request.url.as_deref().unwrap_or_default();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::Validation(format!(
            "url: unsupported scheme in '{url}' (http and https only)"
        )));
    }
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| Error::Validation(format!("url: client setup failed: {e}")))?;
    let response = client
        .get(url)
        .send()
        .map_err(|e| Error::Validation(format!("url: connection failed: {e}")))?;
    if !response.status().is_success() {
        return Err(Error::Validation(format!(
            "url: fetch failed with status {}",
            response.status()
        )));
    }
    let raw = response
        .text()
        .map_err(|e| Error::Validation(format!("url: body read failed: {e}")))?;
    let name = url
        .rsplit('/')
        .find(|part| !part.is_empty())
        .unwrap_or("download")
        .to_string();
    Ok((raw, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_source_enforced() {
        let none = IngestRequest::default();
        assert!(matches!(load_content(&none), Err(Error::Validation(_))));

        let both = IngestRequest {
            content: Some("x".to_string()),
            url: Some("https://example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(load_content(&both), Err(Error::Validation(_))));
    }

    #[test]
    fn test_bad_url_scheme_rejected() {
        let request = IngestRequest {
            url: Some("ftp://example.com/doc.md".to_string()),
            ..Default::default()
        };
        let err = load_content(&request).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let request = IngestRequest {
            file_path: Some("/definitely/not/here.md".to_string()),
            ..Default::default()
        };
        assert!(matches!(load_content(&request), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_inline_content_passthrough() {
        let request = IngestRequest {
            content: Some("# Hello".to_string()),
            ..Default::default()
        };
        let (raw, name) = load_content(&request).unwrap();
        assert_eq!(raw, "# Hello");
        assert_eq!(name, "Untitled");
    }
}
