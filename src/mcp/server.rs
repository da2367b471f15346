//! The stdio MCP server loop.
//!
//! Reads one JSON-RPC request per line from stdin, dispatches each as its
//! own task (handlers are synchronous and run under `spawn_blocking`),
//! and writes exactly one response line per request through a single
//! writer task, after the request's side effects have committed.
//!
//! Readiness is announced on stderr as soon as the registry and store are
//! up, before any model loads. On stdin EOF or a termination signal the
//! loop stops accepting requests, drains in-flight calls within a bounded
//! window, shuts the embedding helper down, and exits cleanly.

use super::dispatch::McpMethod;
use super::rpc::{
    self, JsonRpcRequest, code_for_error, error_response, success_response,
};
use super::tools::ToolRegistry;
use crate::services::ServiceContainer;
use crate::{Error, Result};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;

/// The stdio MCP server.
pub struct McpServer {
    services: Arc<ServiceContainer>,
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    /// Creates a server over an initialized container.
    #[must_use]
    pub fn new(services: Arc<ServiceContainer>) -> Self {
        Self {
            services,
            registry: Arc::new(ToolRegistry::new()),
        }
    }

    /// Runs the request loop until stdin EOF or a termination signal.
    ///
    /// # Errors
    ///
    /// Returns an error only for unrecoverable I/O failures on the
    /// stdio channel itself; tool failures become error responses.
    pub async fn run(self) -> Result<()> {
        let drain_window = Duration::from_secs(self.services.config().server.drain_timeout_secs);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(line) = rx.recv().await {
                if stdout.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdout.write_all(b"\n").await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
        });

        // Readiness goes to stderr before any heavy dependency loads;
        // the first embedding call blocks on helper startup instead.
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            tools = self.registry.list_tools().len(),
            "doctrine mcp server ready"
        );

        let mut in_flight = JoinSet::new();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);
        let terminate = terminate_signal();
        tokio::pin!(terminate);

        loop {
            tokio::select! {
                maybe_line = lines.next_line() => match maybe_line {
                    Ok(Some(line)) => {
                        let services = Arc::clone(&self.services);
                        let registry = Arc::clone(&self.registry);
                        let tx = tx.clone();
                        in_flight.spawn(async move {
                            let response = tokio::task::spawn_blocking(move || {
                                handle_line(&services, &registry, &line)
                            })
                            .await
                            .ok()
                            .flatten();
                            if let Some(response) = response {
                                let _ = tx.send(response);
                            }
                        });
                    },
                    Ok(None) => {
                        tracing::info!("stdin closed, shutting down");
                        break;
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed, shutting down");
                        break;
                    },
                },
                _ = &mut interrupt => {
                    tracing::info!("interrupt received, shutting down");
                    break;
                },
                () = &mut terminate => {
                    tracing::info!("termination signal received, shutting down");
                    break;
                },
            }
        }

        // Bounded drain of in-flight calls.
        let drained = tokio::time::timeout(drain_window, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                window_secs = drain_window.as_secs(),
                "drain window elapsed with calls still in flight"
            );
            in_flight.abort_all();
        }

        // Teardown reverses initialization: helper subprocess first, then
        // the writer channel, then persistence (dropped with the
        // container).
        self.services.shutdown();
        drop(tx);
        let _ = writer.await;
        Ok(())
    }
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        },
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        },
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}

/// Handles one input line, returning the response line (or `None` for
/// notifications and blank lines).
#[must_use]
pub fn handle_line(
    services: &ServiceContainer,
    registry: &ToolRegistry,
    line: &str,
) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
        Ok(request) => request,
        Err(e) => {
            return Some(error_response(
                &Value::Null,
                rpc::PARSE_ERROR,
                &format!("parse error: {e}"),
                None,
            ));
        },
    };

    let method = McpMethod::from(request.method.as_str());
    let Some(id) = request.id else {
        // Notifications get no reply.
        tracing::debug!(method = %method, "notification received");
        return None;
    };

    let result = match method {
        McpMethod::Initialize => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "doctrine",
                "version": env!("CARGO_PKG_VERSION"),
            },
        })),
        McpMethod::Ping => Ok(json!({})),
        McpMethod::ListTools => {
            let tools: Vec<Value> = registry
                .list_tools()
                .iter()
                .map(|d| {
                    json!({
                        "name": d.name,
                        "description": d.description,
                        "inputSchema": d.input_schema,
                    })
                })
                .collect();
            Ok(json!({ "tools": tools }))
        },
        McpMethod::CallTool => call_tool(services, registry, &request.params),
        McpMethod::Unknown(name) => {
            return Some(error_response(
                &id,
                rpc::METHOD_NOT_FOUND,
                &format!("unknown method: {name}"),
                None,
            ));
        },
    };

    Some(match result {
        Ok(value) => success_response(&id, value),
        Err(e) => {
            metrics::counter!("doctrine_tool_errors_total").increment(1);
            error_response(&id, code_for_error(&e), &e.to_string(), None)
        },
    })
}

fn call_tool(
    services: &ServiceContainer,
    registry: &ToolRegistry,
    params: &Value,
) -> Result<Value> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Validation("params.name: required".to_string()))?;
    let arguments = params
        .get("arguments")
        .cloned()
        .unwrap_or_else(|| json!({}));
    tracing::debug!(tool = name, "tool call");
    let started = std::time::Instant::now();
    let result = registry.execute(name, arguments, services);
    metrics::histogram!("doctrine_tool_call_seconds").record(started.elapsed().as_secs_f64());
    result.map(super::tools::ToolResult::into_response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DoctrineConfig;
    use crate::embedding::{Embedder, EmbeddingPipeline};
    use crate::graph::EntityResolver;
    use crate::llm::{GenerateOptions, LlmPipeline, LlmProvider};
    use crate::storage::DocumentStore;

    struct StubEmbedder;
    impl Embedder for StubEmbedder {
        fn dimensions(&self) -> usize {
            4
        }
        fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
            // Stable tiny hash-based vector.
            let mut vector = [0.1f32; 4];
            for (i, byte) in text.bytes().enumerate() {
                vector[i % 4] += f32::from(byte) / 255.0;
            }
            Ok(vector.to_vec())
        }
    }

    struct StubLlm;
    impl LlmProvider for StubLlm {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn generate(&self, _prompt: &str, _options: &GenerateOptions) -> crate::Result<String> {
            Ok(r#"{"claims": []}"#.to_string())
        }
    }

    fn test_services() -> ServiceContainer {
        let mut config = DoctrineConfig::default();
        config.embedding.dimensions = 4;
        config.graph.enabled = false;
        let store = Arc::new(DocumentStore::in_memory().unwrap());
        let embedding = Arc::new(EmbeddingPipeline::with_backends(
            None,
            Box::new(StubEmbedder),
            &config.embedding,
        ));
        let llm = Arc::new(LlmPipeline::new(Box::new(StubLlm), 3));
        ServiceContainer::with_components(config, store, embedding, llm, EntityResolver::new(None))
    }

    #[test]
    fn test_parse_error_has_null_id() {
        let services = test_services();
        let registry = ToolRegistry::new();
        let response = handle_line(&services, &registry, "this is not json").unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        assert!(value["id"].is_null());
        assert_eq!(value["error"]["code"], rpc::PARSE_ERROR);
    }

    #[test]
    fn test_unknown_method() {
        let services = test_services();
        let registry = ToolRegistry::new();
        let response = handle_line(
            &services,
            &registry,
            r#"{"jsonrpc": "2.0", "id": 5, "method": "resources/list"}"#,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["id"], 5);
        assert_eq!(value["error"]["code"], rpc::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_notification_is_silent() {
        let services = test_services();
        let registry = ToolRegistry::new();
        assert!(
            handle_line(
                &services,
                &registry,
                r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#,
            )
            .is_none()
        );
        assert!(handle_line(&services, &registry, "   ").is_none());
    }

    #[test]
    fn test_initialize_and_list_tools() {
        let services = test_services();
        let registry = ToolRegistry::new();

        let response = handle_line(
            &services,
            &registry,
            r#"{"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}"#,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["result"]["serverInfo"]["name"], "doctrine");

        let response = handle_line(
            &services,
            &registry,
            r#"{"jsonrpc": "2.0", "id": 2, "method": "tools/list"}"#,
        )
        .unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["result"]["tools"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_tool_validation_failure_is_invalid_params() {
        let services = test_services();
        let registry = ToolRegistry::new();
        let line = r#"{"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "ingest_document", "arguments": {"content": "x", "document_type": "novel"}}}"#;
        let response = handle_line(&services, &registry, line).unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        assert_eq!(value["error"]["code"], rpc::INVALID_PARAMS);
        assert!(
            value["error"]["message"]
                .as_str()
                .unwrap()
                .contains("document_type")
        );
    }

    #[test]
    fn test_ingest_round_trip() {
        let services = test_services();
        let registry = ToolRegistry::new();
        let line = r##"{"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"name": "ingest_document", "arguments": {"content": "# Tokens\nAccess tokens expire after 1 hour.", "document_type": "spec", "extract_claims": false}}}"##;
        let response = handle_line(&services, &registry, line).unwrap();
        let value: Value = serde_json::from_str(&response).unwrap();
        let structured = &value["result"]["structuredContent"];
        assert_eq!(structured["sections_created"], 1);
        let id = structured["document_id"].as_str().unwrap();
        assert_eq!(id.split('-').count(), 5);
    }
}
