//! Tool schema definitions.
//!
//! JSON Schemas for the five doctrine tools, validated against requests
//! before dispatch.

use super::ToolDefinition;

/// Defines the `ingest_document` tool.
pub fn ingest_document_tool() -> ToolDefinition {
    ToolDefinition {
        name: "ingest_document".to_string(),
        description: "Ingest a document: split into sections, embed, extract claims, and link \
                      entities. Provide exactly one of file_path, content, url."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to a local file"
                },
                "content": {
                    "type": "string",
                    "description": "Inline document content"
                },
                "url": {
                    "type": "string",
                    "description": "URL to fetch (http/https only)"
                },
                "document_type": {
                    "type": "string",
                    "description": "Document category",
                    "enum": ["spec", "guide", "handoff", "prompt", "report", "reference", "decision", "archive"]
                },
                "title": {
                    "type": "string",
                    "description": "Explicit title (derived from content otherwise)"
                },
                "authority_level": {
                    "type": "integer",
                    "description": "Merge weight, 1-10 (default 5)",
                    "minimum": 1,
                    "maximum": 10
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Tags for scope filtering"
                },
                "extract_claims": {
                    "type": "boolean",
                    "description": "Extract atomic claims via the LLM (default true)"
                },
                "generate_embeddings": {
                    "type": "boolean",
                    "description": "Generate section/claim embeddings (default true)"
                },
                "build_entity_graph": {
                    "type": "boolean",
                    "description": "Link entities into the graph store (default true)"
                }
            },
            "required": ["document_type"]
        }),
    }
}

/// Defines the `find_overlaps` tool.
pub fn find_overlaps_tool() -> ToolDefinition {
    ToolDefinition {
        name: "find_overlaps".to_string(),
        description: "Find semantically overlapping sections and conflicting claims across \
                      documents. Provide one of document_ids, scope, tags."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "document_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Explicit document ids"
                },
                "scope": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Document ids or glob patterns over titles"
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Restrict to documents carrying these tags"
                },
                "similarity_threshold": {
                    "type": "number",
                    "description": "Clustering similarity threshold (default 0.8)"
                },
                "conflict_types": {
                    "type": "array",
                    "items": {
                        "type": "string",
                        "enum": ["direct_negation", "value_conflict", "temporal_conflict", "scope_conflict", "implication_conflict"]
                    },
                    "description": "Only report these conflict types"
                },
                "include_resolved": {
                    "type": "boolean",
                    "description": "Include conflicts between already-superseded documents (default false)"
                }
            }
        }),
    }
}

/// Defines the `consolidate_documents` tool.
pub fn consolidate_documents_tool() -> ToolDefinition {
    ToolDefinition {
        name: "consolidate_documents".to_string(),
        description: "Merge overlapping documents into one authoritative document with \
                      per-section provenance. Provide one of document_ids, scope, cluster_id."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "document_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Explicit document ids"
                },
                "scope": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Document ids or glob patterns over titles"
                },
                "cluster_id": {
                    "type": "integer",
                    "description": "Cluster ordinal from a fresh find_overlaps run",
                    "minimum": 0
                },
                "strategy": {
                    "type": "string",
                    "description": "Section choice per cluster (default smart)",
                    "enum": ["smart", "newest_wins", "authority_wins", "merge_all"]
                },
                "conflict_threshold": {
                    "type": "number",
                    "description": "Minimum strength to count as a conflict (default 0.7)"
                },
                "auto_resolve_below": {
                    "type": "number",
                    "description": "Conflicts below this resolve silently (default 0.3)"
                },
                "require_human_above": {
                    "type": "number",
                    "description": "Conflicts above this go to human review (default 0.9)"
                },
                "output_format": {
                    "type": "string",
                    "description": "Rendering of the consolidated document (default markdown)",
                    "enum": ["markdown", "json", "yaml"]
                },
                "include_provenance": {
                    "type": "boolean",
                    "description": "Emit per-section provenance (default true)"
                },
                "dry_run": {
                    "type": "boolean",
                    "description": "Analyze and render without persisting (default false)"
                }
            }
        }),
    }
}

/// Defines the `get_source_of_truth` tool.
pub fn get_source_of_truth_tool() -> ToolDefinition {
    ToolDefinition {
        name: "get_source_of_truth".to_string(),
        description: "Answer a natural-language question from the stored documents with \
                      per-source ranking, provenance, and conflict surfacing."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question"
                },
                "query_type": {
                    "type": "string",
                    "description": "Free-form query category"
                },
                "scope": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Document ids, tag: filters, or title globs"
                },
                "max_sources": {
                    "type": "integer",
                    "description": "Maximum source documents (default 5)",
                    "minimum": 1,
                    "maximum": 50
                },
                "verify_claims": {
                    "type": "boolean",
                    "description": "Verify supporting claims with self-consistency (default false)"
                },
                "include_deprecated": {
                    "type": "boolean",
                    "description": "Include deprecated/archived documents (default false)"
                }
            },
            "required": ["query"]
        }),
    }
}

/// Defines the `deprecate_document` tool.
pub fn deprecate_document_tool() -> ToolDefinition {
    ToolDefinition {
        name: "deprecate_document".to_string(),
        description: "Deprecate (or archive) a document, optionally recording which document \
                      supersedes it."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "document_id": {
                    "type": "string",
                    "description": "The document to deprecate"
                },
                "reason": {
                    "type": "string",
                    "description": "Why it is being deprecated"
                },
                "superseded_by": {
                    "type": "string",
                    "description": "Replacement document id"
                },
                "migrate_references": {
                    "type": "boolean",
                    "description": "Re-point existing supersession links at the replacement (default false)"
                },
                "archive": {
                    "type": "boolean",
                    "description": "Archive instead of deprecate (default false)"
                }
            },
            "required": ["document_id", "reason"]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tool_declares_an_object_schema() {
        for definition in [
            ingest_document_tool(),
            find_overlaps_tool(),
            consolidate_documents_tool(),
            get_source_of_truth_tool(),
            deprecate_document_tool(),
        ] {
            assert_eq!(definition.input_schema["type"], "object");
            assert!(!definition.description.is_empty());
        }
    }

    #[test]
    fn test_document_type_enum_matches_model() {
        let schema = ingest_document_tool().input_schema;
        let values = schema["properties"]["document_type"]["enum"]
            .as_array()
            .unwrap()
            .len();
        assert_eq!(values, crate::models::DocumentType::all().len());
    }
}
