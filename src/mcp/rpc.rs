//! JSON-RPC 2.0 framing and error-code mapping.
//!
//! One JSON object per line on stdin/stdout. Standard codes for protocol
//! failures; the -32000 range carries tool errors.

use crate::Error;
use serde::Deserialize;
use serde_json::{Value, json};

/// Invalid JSON was received.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON was not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// Unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Request failed schema validation.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal error.
pub const INTERNAL_ERROR: i64 = -32603;

/// Missing document or section.
pub const NOT_FOUND: i64 = -32001;
/// Persistence failure.
pub const PERSISTENCE_ERROR: i64 = -32002;
/// Both embedding modes exhausted.
pub const EMBEDDING_UNAVAILABLE: i64 = -32003;
/// LLM call timed out.
pub const LLM_TIMEOUT: i64 = -32004;
/// LLM call failed.
pub const LLM_ERROR: i64 = -32005;
/// Structured extraction failed after retries.
pub const EXTRACTION_FAILED: i64 = -32006;
/// Graph store unreachable.
pub const GRAPH_UNAVAILABLE: i64 = -32007;

/// An incoming request (or notification, when `id` is absent).
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version marker; must be "2.0".
    #[serde(default)]
    pub jsonrpc: String,
    /// Request id; absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// Builds a success response line.
#[must_use]
pub fn success_response(id: &Value, result: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string()
}

/// Builds an error response line.
#[must_use]
pub fn error_response(id: &Value, code: i64, message: &str, data: Option<Value>) -> String {
    let mut error = json!({"code": code, "message": message});
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({"jsonrpc": "2.0", "id": id, "error": error}).to_string()
}

/// Maps a service error to its JSON-RPC error code.
#[must_use]
pub fn code_for_error(error: &Error) -> i64 {
    match error {
        Error::Validation(_) => INVALID_PARAMS,
        Error::NotFound(_) => NOT_FOUND,
        Error::Persistence { .. } | Error::DuplicateContent { .. } => PERSISTENCE_ERROR,
        Error::EmbeddingUnavailable(_) => EMBEDDING_UNAVAILABLE,
        Error::LlmTimeout { .. } => LLM_TIMEOUT,
        Error::Llm(_) => LLM_ERROR,
        Error::StructuredExtraction { .. } => EXTRACTION_FAILED,
        Error::GraphUnavailable(_) => GRAPH_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_with_defaults() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc": "2.0", "id": 1, "method": "ping"}"#).unwrap();
        assert_eq!(request.method, "ping");
        assert_eq!(request.id, Some(json!(1)));
        assert!(request.params.is_null());
    }

    #[test]
    fn test_notification_has_no_id() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#)
                .unwrap();
        assert!(request.id.is_none());
    }

    #[test]
    fn test_response_shapes() {
        let ok = success_response(&json!(7), json!({"x": 1}));
        let value: Value = serde_json::from_str(&ok).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["result"]["x"], 1);

        let err = error_response(&json!("abc"), METHOD_NOT_FOUND, "unknown method", None);
        let value: Value = serde_json::from_str(&err).unwrap();
        assert_eq!(value["error"]["code"], METHOD_NOT_FOUND);
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(code_for_error(&Error::Validation("x".into())), INVALID_PARAMS);
        assert_eq!(code_for_error(&Error::NotFound("x".into())), NOT_FOUND);
        assert_eq!(
            code_for_error(&Error::LlmTimeout { seconds: 1 }),
            LLM_TIMEOUT
        );
    }
}
