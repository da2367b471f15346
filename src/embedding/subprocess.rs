//! Helper-subprocess embedder (primary mode).
//!
//! Hosts a long-lived child process that reads one JSON request per line
//! on stdin and answers one JSON response per line on stdout:
//! request `{"texts": [..]}`, response `{"embeddings": [[..]]}` or
//! `{"error": ".."}`. Calls are serialized onto the child (one outstanding
//! request at a time) by the state mutex, preserving request/response
//! pairing over the single pipe pair.
//!
//! Startup is lazy: the child is spawned on the first call, which blocks
//! up to `init_timeout`; later calls are bounded by `call_timeout`. A
//! helper that times out or dies is killed and respawned on the next call.

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

#[derive(Debug, Serialize)]
struct HelperRequest<'a> {
    texts: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct HelperResponse {
    #[serde(default)]
    embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    error: Option<String>,
}

/// A running helper child with its write end and line receiver.
struct Helper {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<std::io::Result<String>>,
    /// First response after spawn is allowed the longer init bound.
    initialized: bool,
}

enum HelperState {
    NotStarted,
    Running(Helper),
    /// Spawn failed; do not keep retrying a command that cannot start.
    Failed(String),
}

/// Embedder backed by a helper subprocess.
pub struct SubprocessEmbedder {
    command: Vec<String>,
    dimensions: usize,
    init_timeout: Duration,
    call_timeout: Duration,
    state: Mutex<HelperState>,
}

impl SubprocessEmbedder {
    /// Creates an embedder for the configured helper command line.
    ///
    /// Returns `None` when no helper command is configured.
    #[must_use]
    pub fn from_config(config: &EmbeddingConfig) -> Option<Self> {
        let command: Vec<String> = config
            .helper_command
            .as_deref()?
            .split_whitespace()
            .map(String::from)
            .collect();
        if command.is_empty() {
            return None;
        }
        Some(Self {
            command,
            dimensions: config.dimensions,
            init_timeout: config.init_timeout(),
            call_timeout: config.call_timeout(),
            state: Mutex::new(HelperState::NotStarted),
        })
    }

    fn spawn(&self) -> Result<Helper> {
        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                Error::EmbeddingUnavailable(format!(
                    "helper '{}' failed to start: {e}",
                    self.command[0]
                ))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            Error::EmbeddingUnavailable("helper stdin unavailable".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::EmbeddingUnavailable("helper stdout unavailable".to_string())
        })?;

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        });

        tracing::info!(command = %self.command.join(" "), "embedding helper spawned");
        Ok(Helper {
            child,
            stdin,
            lines: rx,
            initialized: false,
        })
    }

    /// One request/response round trip against a running helper.
    fn round_trip(helper: &mut Helper, texts: &[&str], timeout: Duration) -> Result<Vec<Vec<f32>>> {
        let request = serde_json::to_string(&HelperRequest { texts })
            .map_err(|e| Error::EmbeddingUnavailable(format!("request encode: {e}")))?;
        helper
            .stdin
            .write_all(request.as_bytes())
            .and_then(|()| helper.stdin.write_all(b"\n"))
            .and_then(|()| helper.stdin.flush())
            .map_err(|e| Error::EmbeddingUnavailable(format!("helper write failed: {e}")))?;

        let line = match helper.lines.recv_timeout(timeout) {
            Ok(Ok(line)) => line,
            Ok(Err(e)) => {
                return Err(Error::EmbeddingUnavailable(format!(
                    "helper read failed: {e}"
                )));
            },
            Err(RecvTimeoutError::Timeout) => {
                return Err(Error::EmbeddingUnavailable(format!(
                    "helper timed out after {}s",
                    timeout.as_secs()
                )));
            },
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::EmbeddingUnavailable(
                    "helper exited unexpectedly".to_string(),
                ));
            },
        };

        let response: HelperResponse = serde_json::from_str(&line)
            .map_err(|e| Error::EmbeddingUnavailable(format!("helper response parse: {e}")))?;
        if let Some(error) = response.error {
            return Err(Error::EmbeddingUnavailable(format!("helper error: {error}")));
        }
        response
            .embeddings
            .ok_or_else(|| Error::EmbeddingUnavailable("helper response missing embeddings".into()))
    }

    fn encode_locked(&self, state: &mut HelperState, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if let HelperState::Failed(reason) = state {
            return Err(Error::EmbeddingUnavailable(reason.clone()));
        }
        if matches!(state, HelperState::NotStarted) {
            match self.spawn() {
                Ok(helper) => *state = HelperState::Running(helper),
                Err(e) => {
                    *state = HelperState::Failed(e.to_string());
                    return Err(e);
                },
            }
        }
        let HelperState::Running(helper) = state else {
            return Err(Error::EmbeddingUnavailable("helper not running".to_string()));
        };

        let timeout = if helper.initialized {
            self.call_timeout
        } else {
            // First call covers model load.
            self.init_timeout + self.call_timeout
        };

        match Self::round_trip(helper, texts, timeout) {
            Ok(embeddings) => {
                helper.initialized = true;
                if embeddings.len() != texts.len() {
                    return Err(Error::EmbeddingUnavailable(format!(
                        "helper returned {} embeddings for {} texts",
                        embeddings.len(),
                        texts.len()
                    )));
                }
                for embedding in &embeddings {
                    if embedding.len() != self.dimensions {
                        return Err(Error::EmbeddingUnavailable(format!(
                            "helper returned dimension {} (expected {})",
                            embedding.len(),
                            self.dimensions
                        )));
                    }
                }
                Ok(embeddings)
            },
            Err(e) => {
                // Kill the wedged child; the next call respawns lazily.
                tracing::warn!(error = %e, "embedding helper failed, killing");
                metrics::counter!("doctrine_embed_helper_failures_total").increment(1);
                if let HelperState::Running(mut helper) =
                    std::mem::replace(state, HelperState::NotStarted)
                {
                    let _ = helper.child.kill();
                    let _ = helper.child.wait();
                }
                Err(e)
            },
        }
    }

    /// Shuts the helper down: closes its stdin (EOF), waits up to `wait`
    /// for a clean exit, then force-terminates.
    pub fn shutdown(&self, wait: Duration) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let HelperState::Running(mut helper) =
            std::mem::replace(&mut *state, HelperState::NotStarted)
        {
            drop(helper.stdin);
            let deadline = Instant::now() + wait;
            loop {
                match helper.child.try_wait() {
                    Ok(Some(status)) => {
                        tracing::info!(?status, "embedding helper exited");
                        return;
                    },
                    Ok(None) if Instant::now() < deadline => {
                        std::thread::sleep(Duration::from_millis(50));
                    },
                    _ => break,
                }
            }
            tracing::warn!("embedding helper did not exit in time, killing");
            let _ = helper.child.kill();
            let _ = helper.child.wait();
        }
    }
}

impl Embedder for SubprocessEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text])?;
        batch
            .pop()
            .ok_or_else(|| Error::EmbeddingUnavailable("empty helper batch".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.encode_locked(&mut state, texts)
    }
}

impl Drop for SubprocessEmbedder {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(200));
    }
}
