//! Tool execution handlers.
//!
//! Each handler deserializes its validated arguments, applies input
//! length guards, runs the service operation, and wraps the structured
//! result.

use super::ToolResult;
use crate::mcp::tool_types::{
    ConsolidateArgs, DeprecateArgs, FindOverlapsArgs, IngestArgs, QueryArgs,
};
use crate::services::ServiceContainer;
use crate::{Error, Result};
use serde_json::Value;

/// Maximum accepted inline content size. Large specs are fine; this only
/// guards against accidental multi-gigabyte payloads on a line-framed
/// channel.
const MAX_CONTENT_LENGTH: usize = 4 * 1_048_576; // 4 MB

/// Maximum accepted query length.
const MAX_QUERY_LENGTH: usize = 10_240; // 10 KB

fn validate_input_length(input: &str, field_name: &str, max_length: usize) -> Result<()> {
    if input.len() > max_length {
        return Err(Error::Validation(format!(
            "{field_name}: exceeds maximum length ({} > {max_length} bytes)",
            input.len()
        )));
    }
    Ok(())
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| Error::Validation(e.to_string()))
}

fn to_result<T: serde::Serialize>(report: &T) -> Result<ToolResult> {
    let structured =
        serde_json::to_value(report).map_err(|e| Error::Validation(e.to_string()))?;
    Ok(ToolResult::success(structured))
}

/// Executes `ingest_document`.
pub fn execute_ingest(services: &ServiceContainer, arguments: Value) -> Result<ToolResult> {
    let args: IngestArgs = parse_args(arguments)?;
    if let Some(content) = &args.content {
        validate_input_length(content, "content", MAX_CONTENT_LENGTH)?;
    }
    let report = services.ingest_document(args.into_request()?)?;
    to_result(&report)
}

/// Executes `find_overlaps`.
pub fn execute_find_overlaps(
    services: &ServiceContainer,
    arguments: Value,
) -> Result<ToolResult> {
    let args: FindOverlapsArgs = parse_args(arguments)?;
    let report = services.find_overlaps(args.into_request()?)?;
    to_result(&report)
}

/// Executes `consolidate_documents`.
pub fn execute_consolidate(
    services: &ServiceContainer,
    arguments: Value,
) -> Result<ToolResult> {
    let args: ConsolidateArgs = parse_args(arguments)?;
    let report = services.consolidate_documents(args.into_request()?)?;
    to_result(&report)
}

/// Executes `get_source_of_truth`.
pub fn execute_get_source_of_truth(
    services: &ServiceContainer,
    arguments: Value,
) -> Result<ToolResult> {
    let args: QueryArgs = parse_args(arguments)?;
    validate_input_length(&args.query, "query", MAX_QUERY_LENGTH)?;
    let report = services.get_source_of_truth(args.into_request())?;
    to_result(&report)
}

/// Executes `deprecate_document`.
pub fn execute_deprecate(services: &ServiceContainer, arguments: Value) -> Result<ToolResult> {
    let args: DeprecateArgs = parse_args(arguments)?;
    let report = services.deprecate_document(args.into_request())?;
    to_result(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_input_length() {
        assert!(validate_input_length("short", "content", 100).is_ok());
        let long = "x".repeat(101);
        let err = validate_input_length(&long, "content", 100).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("101 > 100"));
    }

    #[test]
    fn test_parse_args_reports_validation_error() {
        let result: Result<QueryArgs> = parse_args(serde_json::json!({"max_sources": 3}));
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
