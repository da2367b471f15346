//! HTTP client for the local completion endpoint.

use super::{ChatMessage, GenerateOptions, LlmHttpConfig, LlmProvider, build_http_client};
use crate::config::LlmConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Client for an endpoint exposing `POST /api/generate` and
/// `POST /api/chat` (streaming disabled; one JSON object per response).
pub struct HttpLlmClient {
    /// Endpoint base URL.
    endpoint: String,
    /// Model to use.
    model: String,
    /// Request timeout, kept for timeout error reporting.
    timeout_secs: u64,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl HttpLlmClient {
    /// Creates a client from the LLM configuration.
    #[must_use]
    pub fn from_config(config: &LlmConfig) -> Self {
        let http = LlmHttpConfig {
            timeout_ms: config.timeout_secs * 1000,
            connect_timeout_ms: config.connect_timeout_ms,
        };
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            client: build_http_client(http),
        }
    }

    /// Sets the endpoint (builder style, mainly for tests).
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn map_send_error(&self, operation: &str, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            tracing::error!(
                model = %self.model,
                operation,
                timeout_secs = self.timeout_secs,
                "LLM request timed out"
            );
            return Error::LlmTimeout {
                seconds: self.timeout_secs,
            };
        }
        let error_kind = if e.is_connect() {
            "connect"
        } else if e.is_request() {
            "request"
        } else {
            "unknown"
        };
        tracing::error!(
            model = %self.model,
            operation,
            error = %e,
            error_kind,
            "LLM request failed"
        );
        Error::Llm(format!("{error_kind} error: {e}"))
    }

    fn check_status(operation: &str, response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().unwrap_or_default();
        tracing::error!(operation, status = %status, body = %body, "LLM API returned error status");
        Err(Error::Llm(format!("API returned status {status}: {body}")))
    }
}

impl LlmProvider for HttpLlmClient {
    fn name(&self) -> &'static str {
        "http"
    }

    fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options,
        };
        let response = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .map_err(|e| self.map_send_error("generate", &e))?;
        let response = Self::check_status("generate", response)?;
        let parsed: GenerateResponse = response
            .json()
            .map_err(|e| Error::Llm(format!("response parse: {e}")))?;
        Ok(parsed.response)
    }

    fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&request)
            .send()
            .map_err(|e| self.map_send_error("chat", &e))?;
        let response = Self::check_status("chat", response)?;
        let parsed: ChatResponse = response
            .json()
            .map_err(|e| Error::Llm(format!("chat response parse: {e}")))?;
        Ok(parsed.message.content)
    }

    fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Request to the generate API.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

/// Response from the generate API.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Request to the chat API.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Response from the chat API.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DoctrineConfig;

    fn unreachable_client() -> HttpLlmClient {
        let mut config = DoctrineConfig::default().llm;
        config.endpoint = "http://127.0.0.1:1".to_string();
        config.timeout_secs = 1;
        HttpLlmClient::from_config(&config)
    }

    #[test]
    fn test_client_name() {
        assert_eq!(unreachable_client().name(), "http");
    }

    #[test]
    fn test_unreachable_endpoint_maps_to_llm_error() {
        let client = unreachable_client();
        let err = client
            .generate("hello", &GenerateOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Llm(_) | Error::LlmTimeout { .. }));
        assert!(!client.is_available());
    }

    #[test]
    fn test_request_serialization_shape() {
        let options = GenerateOptions {
            temperature: Some(0.7),
            seed: None,
        };
        let request = GenerateRequest {
            model: "llama3.2",
            prompt: "hi",
            stream: false,
            options: &options,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2");
        assert_eq!(json["stream"], false);
        assert!((json["options"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!(json["options"].get("seed").is_none());
    }
}
