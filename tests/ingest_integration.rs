//! Ingest pipeline integration tests: parsing, persistence invariants,
//! idempotence, and graceful LLM absence.

mod common;

use common::{DOC_A, container, container_with_llm, UnreachableLlm};
use doctrine::models::{DocumentType, VectorOwner};
use doctrine::services::IngestRequest;

fn ingest_request(content: &str, document_type: DocumentType) -> IngestRequest {
    IngestRequest {
        content: Some(content.to_string()),
        document_type,
        ..Default::default()
    }
}

#[test]
fn ingest_creates_sections_claims_and_vectors() {
    let services = container();
    let report = services
        .ingest_document(IngestRequest {
            authority_level: Some(8),
            tags: ["auth"].iter().map(|s| (*s).to_string()).collect(),
            ..ingest_request(DOC_A, DocumentType::Spec)
        })
        .unwrap();

    assert_eq!(report.sections_created, 3);
    assert!(report.claims_extracted >= 1);
    assert!(report.entities_linked >= 1);

    // Document row invariants.
    let document = services
        .store()
        .get_document(&report.document_id)
        .unwrap()
        .unwrap();
    assert_eq!(document.authority_level, 8);
    assert_eq!(document.raw_content, DOC_A);

    // Every section belongs to the document, byte ranges sit inside the
    // raw content, and ordinals are contiguous from zero.
    let sections = services
        .store()
        .sections_for_document(&report.document_id)
        .unwrap();
    assert_eq!(sections.len(), 3);
    for (i, section) in sections.iter().enumerate() {
        assert_eq!(section.ordinal, i);
        assert_eq!(section.document_id, report.document_id);
        let (start, end) = section.byte_range;
        assert!(start <= end && end <= DOC_A.len());

        // Exactly one vector per section, at the configured dimension.
        let vector = services
            .store()
            .get_vector(VectorOwner::Section, section.id.as_str())
            .unwrap()
            .unwrap();
        assert_eq!(vector.len(), common::DIMENSIONS);
    }

    // Claim spans lie inside their section content.
    for section in &sections {
        for claim in services.store().claims_for_section(&section.id).unwrap() {
            if let Some((start, end)) = claim.source_span {
                assert!(start <= end && end <= section.content.len());
            }
        }
    }

    // Ids are canonical UUIDs.
    assert_eq!(report.document_id.as_str().split('-').count(), 5);
}

#[test]
fn reingest_same_content_is_idempotent() {
    let services = container();
    let first = services
        .ingest_document(ingest_request(DOC_A, DocumentType::Spec))
        .unwrap();
    let active_before = services.store().count_active_documents().unwrap();

    let second = services
        .ingest_document(IngestRequest {
            tags: ["revised"].iter().map(|s| (*s).to_string()).collect(),
            authority_level: Some(9),
            ..ingest_request(DOC_A, DocumentType::Decision)
        })
        .unwrap();

    // Same id, no new active document, metadata updated in place.
    assert_eq!(second.document_id, first.document_id);
    assert_eq!(
        services.store().count_active_documents().unwrap(),
        active_before
    );
    let document = services
        .store()
        .get_document(&first.document_id)
        .unwrap()
        .unwrap();
    assert_eq!(document.document_type, DocumentType::Decision);
    assert_eq!(document.authority_level, 9);
    assert!(document.tags.contains("revised"));
    assert!(second.warnings.iter().any(|w| w.contains("metadata")));
}

#[test]
fn large_document_ingests_completely() {
    // ≥ 100 KB across many sections.
    let mut content = String::new();
    let mut expected_sections = 0;
    while content.len() < 120_000 {
        expected_sections += 1;
        content.push_str(&format!(
            "# Topic {expected_sections}\n\n{}\n\n",
            "Operational notes line with enough words to carry weight. ".repeat(40)
        ));
    }

    let services = container();
    let report = services
        .ingest_document(ingest_request(&content, DocumentType::Reference))
        .unwrap();
    assert_eq!(report.sections_created, expected_sections);

    let sections = services
        .store()
        .sections_for_document(&report.document_id)
        .unwrap();
    assert_eq!(sections.len(), expected_sections);
}

#[test]
fn ingest_survives_llm_absence() {
    let services = container_with_llm(Box::new(UnreachableLlm));
    let report = services
        .ingest_document(ingest_request(DOC_A, DocumentType::Spec))
        .unwrap();

    // Document committed, sections present, zero claims, LLM warning.
    assert_eq!(report.sections_created, 3);
    assert_eq!(report.claims_extracted, 0);
    assert!(report.warnings.iter().any(|w| w.contains("llm")));
}

#[test]
fn plain_text_becomes_single_section() {
    let services = container();
    let report = services
        .ingest_document(IngestRequest {
            title: Some("Ops Notes".to_string()),
            ..ingest_request("no headings here, just prose", DocumentType::Handoff)
        })
        .unwrap();
    assert_eq!(report.sections_created, 1);

    let sections = services
        .store()
        .sections_for_document(&report.document_id)
        .unwrap();
    assert_eq!(sections[0].content, "no headings here, just prose");
}
