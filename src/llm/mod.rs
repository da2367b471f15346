//! LLM client abstraction.
//!
//! Speaks the local completion endpoint's HTTP JSON protocol directly
//! (`POST /api/generate`, `POST /api/chat`) through a blocking reqwest
//! client rather than a vendor SDK: vendor libraries in this ecosystem
//! impose internal timeouts that cannot be overridden, and CPU-only
//! inference routinely needs minutes per call.
//!
//! [`LlmPipeline`] layers the higher-level operations on top of a
//! provider: multi-sample self-consistency voting and retried structured
//! (JSON) extraction.

mod client;
mod pipeline;

pub use client::HttpLlmClient;
pub use pipeline::{LlmPipeline, SelfConsistency};

use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A chat message with an explicit role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role: `system`, `user`, or `assistant`.
    pub role: String,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Options forwarded with a generate call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateOptions {
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Sampling seed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Trait for LLM providers.
pub trait LlmProvider: Send + Sync {
    /// The provider name.
    fn name(&self) -> &'static str;

    /// Generates a completion for the given prompt.
    ///
    /// # Errors
    ///
    /// [`crate::Error::LlmTimeout`] when the configured timeout expires;
    /// [`crate::Error::Llm`] otherwise.
    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;

    /// Multi-turn completion with explicit roles.
    ///
    /// Default implementation flattens the conversation into one prompt;
    /// providers with native chat support should override.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`LlmProvider::generate`].
    fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let flattened = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        self.generate(&flattened, &GenerateOptions::default())
    }

    /// Returns true when the endpoint answers a cheap probe. Used for the
    /// non-fatal startup check; never required for correctness.
    fn is_available(&self) -> bool {
        false
    }
}

/// HTTP client configuration for LLM requests.
#[derive(Debug, Clone, Copy)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            // CPU inference is slow; ten minutes by default.
            timeout_ms: 600_000,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Builds a blocking HTTP client with the configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }
    builder.build().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "failed to build LLM HTTP client, using defaults");
        reqwest::blocking::Client::new()
    })
}

/// Extracts JSON from an LLM response that may wrap it in markdown code
/// blocks or prose.
///
/// Handles, in order: ` ```json ` blocks, plain ` ``` ` blocks, a raw
/// object (first `{` to last `}`), a raw array (first `[` to last `]`).
/// Falls back to the trimmed input.
#[must_use]
pub fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some((json_start, end)) = trimmed.find("```json").and_then(|start| {
        let json_start = start + 7;
        trimmed[json_start..]
            .find("```")
            .map(|end| (json_start, end))
    }) {
        return trimmed[json_start..json_start + end].trim();
    }

    if let Some((json_start, end)) = trimmed.find("```").and_then(|start| {
        let content_start = start + 3;
        let after_marker = &trimmed[content_start..];
        let json_start = after_marker
            .find(['{', '['])
            .map_or(content_start, |pos| content_start + pos);
        trimmed[json_start..]
            .find("```")
            .map(|end| (json_start, end))
    }) {
        return trimmed[json_start..json_start + end].trim();
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }

    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw() {
        let response = r#"{"key": "value"}"#;
        assert_eq!(extract_json_from_response(response), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_markdown() {
        let response = "```json\n{\"key\": \"value\"}\n```";
        assert!(extract_json_from_response(response).contains("\"key\""));
    }

    #[test]
    fn test_extract_json_with_prose() {
        let response = "Here is the result: {\"key\": \"value\"} hope this helps";
        assert_eq!(extract_json_from_response(response), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_array() {
        let response = r#"The claims are: [{"subject": "a"}]"#;
        assert_eq!(
            extract_json_from_response(response),
            r#"[{"subject": "a"}]"#
        );
    }

    #[test]
    fn test_extract_json_fenced_without_marker() {
        let response = "```\n{\"x\": 1}\n```";
        assert_eq!(extract_json_from_response(response), r#"{"x": 1}"#);
    }

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
    }
}
