//! Declarative tool registry.
//!
//! A mapping from tool name to `{schema, handler}` built at startup.
//! Validation runs as a separate pass before dispatch; handlers receive
//! already-validated arguments plus the process-wide service container.

mod definitions;
mod handlers;

use crate::mcp::validate::validate_against_schema;
use crate::services::ServiceContainer;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Definition of an MCP tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Tool description.
    pub description: String,
    /// JSON Schema for input validation.
    pub input_schema: Value,
}

/// Result of a tool execution, rendered MCP-style: text content for
/// display plus the structured result object.
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// The structured result object (the tool's wire contract).
    pub structured: Value,
    /// Whether the result represents an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Wraps a successful structured result.
    #[must_use]
    pub const fn success(structured: Value) -> Self {
        Self {
            structured,
            is_error: false,
        }
    }

    /// Renders into the `tools/call` response payload.
    #[must_use]
    pub fn into_response(self) -> Value {
        let text = serde_json::to_string_pretty(&self.structured)
            .unwrap_or_else(|_| self.structured.to_string());
        serde_json::json!({
            "content": [{"type": "text", "text": text}],
            "structuredContent": self.structured,
            "isError": self.is_error,
        })
    }
}

type Handler = fn(&ServiceContainer, Value) -> Result<ToolResult>;

/// Registry of the doctrine tools.
pub struct ToolRegistry {
    tools: HashMap<String, (ToolDefinition, Handler)>,
}

impl ToolRegistry {
    /// Creates the registry with all doctrine tools.
    #[must_use]
    pub fn new() -> Self {
        let mut tools: HashMap<String, (ToolDefinition, Handler)> = HashMap::new();
        let entries: [(ToolDefinition, Handler); 5] = [
            (definitions::ingest_document_tool(), handlers::execute_ingest),
            (definitions::find_overlaps_tool(), handlers::execute_find_overlaps),
            (
                definitions::consolidate_documents_tool(),
                handlers::execute_consolidate,
            ),
            (
                definitions::get_source_of_truth_tool(),
                handlers::execute_get_source_of_truth,
            ),
            (
                definitions::deprecate_document_tool(),
                handlers::execute_deprecate,
            ),
        ];
        for (definition, handler) in entries {
            tools.insert(definition.name.clone(), (definition, handler));
        }
        Self { tools }
    }

    /// Returns all tool definitions, sorted by name.
    #[must_use]
    pub fn list_tools(&self) -> Vec<&ToolDefinition> {
        let mut definitions: Vec<&ToolDefinition> =
            self.tools.values().map(|(d, _)| d).collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Gets a tool definition by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|(d, _)| d)
    }

    /// Validates `arguments` against the tool's schema, then executes it.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for unknown tools or schema violations; the
    /// handler's error otherwise.
    pub fn execute(
        &self,
        name: &str,
        arguments: Value,
        services: &ServiceContainer,
    ) -> Result<ToolResult> {
        let Some((definition, handler)) = self.tools.get(name) else {
            return Err(Error::Validation(format!("unknown tool: {name}")));
        };
        validate_against_schema(&definition.input_schema, &arguments)
            .map_err(Error::Validation)?;
        handler(services, arguments)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lists_all_tools() {
        let registry = ToolRegistry::new();
        let names: Vec<&str> = registry
            .list_tools()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "consolidate_documents",
                "deprecate_document",
                "find_overlaps",
                "get_source_of_truth",
                "ingest_document",
            ]
        );
    }

    #[test]
    fn test_get_tool() {
        let registry = ToolRegistry::new();
        assert!(registry.get_tool("ingest_document").is_some());
        assert!(registry.get_tool("unknown_tool").is_none());
    }

    #[test]
    fn test_tool_result_response_shape() {
        let result = ToolResult::success(serde_json::json!({"document_id": "x"}));
        let response = result.into_response();
        assert_eq!(response["isError"], false);
        assert_eq!(response["structuredContent"]["document_id"], "x");
        assert_eq!(response["content"][0]["type"], "text");
    }
}
