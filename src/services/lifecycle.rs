//! Document lifecycle (`deprecate_document`).

use super::ServiceContainer;
use crate::models::{DocumentId, DocumentStatus};
use crate::{Error, Result, current_timestamp};
use serde::Serialize;
use tracing::instrument;

/// Parameters for deprecating a document.
#[derive(Debug, Clone, Default)]
pub struct DeprecateRequest {
    /// The document to deprecate.
    pub document_id: String,
    /// Why it is being deprecated.
    pub reason: String,
    /// Optional replacement document.
    pub superseded_by: Option<String>,
    /// Re-point existing supersession links at the replacement
    /// (default false).
    pub migrate_references: Option<bool>,
    /// Archive instead of deprecate (default false).
    pub archive: Option<bool>,
}

/// Result of a deprecation.
#[derive(Debug, Clone, Serialize)]
pub struct DeprecateReport {
    /// Resulting status: `deprecated` or `archived`.
    pub status: DocumentStatus,
    /// When the transition happened (Unix epoch seconds).
    pub deprecated_at: u64,
    /// Supersession links migrated to the replacement.
    pub references_migrated: usize,
}

impl ServiceContainer {
    /// Deprecates (or archives) a document, optionally recording a
    /// supersession link to its replacement.
    #[instrument(skip(self, request), fields(document_id = %request.document_id))]
    pub fn deprecate_document(&self, request: DeprecateRequest) -> Result<DeprecateReport> {
        if request.reason.trim().is_empty() {
            return Err(Error::Validation("reason: must not be empty".to_string()));
        }
        let document_id = DocumentId::from(request.document_id.as_str());
        if self.store().get_document(&document_id)?.is_none() {
            return Err(Error::NotFound(format!("document {document_id}")));
        }

        let target_status = if request.archive.unwrap_or(false) {
            DocumentStatus::Archived
        } else {
            DocumentStatus::Deprecated
        };

        let mut references_migrated = 0;
        if let Some(superseded_by) = &request.superseded_by {
            let replacement = DocumentId::from(superseded_by.as_str());
            self.store()
                .append_supersession(&document_id, &replacement, &request.reason)?;

            if request.migrate_references.unwrap_or(false) {
                // Links that named the deprecated document as the
                // replacement are re-pointed at the new one; the original
                // rows stay (supersessions are append-only).
                for record in self.store().supersessions_pointing_to(&document_id)? {
                    if record.old_document_id == replacement {
                        continue;
                    }
                    match self.store().append_supersession(
                        &record.old_document_id,
                        &replacement,
                        &format!("migrated from {document_id}: {}", record.reason),
                    ) {
                        Ok(_) => references_migrated += 1,
                        Err(e) => {
                            tracing::warn!(error = %e, "reference migration skipped");
                        },
                    }
                }
            }
        }

        self.store().set_document_status(&document_id, target_status)?;
        metrics::counter!("doctrine_documents_deprecated_total").increment(1);

        Ok(DeprecateReport {
            status: target_status,
            deprecated_at: current_timestamp(),
            references_migrated,
        })
    }
}
