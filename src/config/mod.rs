//! Configuration management.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file
//! (explicit `--config` path, `./doctrine.toml`, or the user config
//! directory), then `DOCTRINE_*` environment overrides. Credentials and
//! endpoints are only ever supplied through the file or the environment;
//! nothing sensitive is logged.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for doctrine.
#[derive(Debug, Clone)]
pub struct DoctrineConfig {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Embedding pipeline configuration.
    pub embedding: EmbeddingConfig,
    /// LLM pipeline configuration.
    pub llm: LlmConfig,
    /// Claim extraction configuration.
    pub extraction: ExtractionConfig,
    /// Conflict detection configuration.
    pub conflict: ConflictConfig,
    /// Merge engine configuration.
    pub merge: MergeConfig,
    /// Query engine configuration.
    pub query: QueryConfig,
    /// Entity graph configuration.
    pub graph: GraphConfig,
    /// Server lifecycle configuration.
    pub server: ServerConfig,
}

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path to the authoritative SQLite database.
    pub db_path: PathBuf,
}

/// Embedding pipeline configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Helper subprocess command line (program plus arguments). `None`
    /// disables the primary mode; calls go straight to the fallback.
    pub helper_command: Option<String>,
    /// Model identifier, part of the cache key and of fallback requests.
    pub model: String,
    /// Process-wide vector dimension D.
    pub dimensions: usize,
    /// Batch size for encode calls.
    pub batch_size: usize,
    /// Bound on helper startup, in seconds.
    pub init_timeout_secs: u64,
    /// Bound on a single helper round-trip, in seconds.
    pub call_timeout_secs: u64,
    /// Remote fallback endpoint base URL (`POST {base}/api/embeddings`).
    pub fallback_endpoint: String,
    /// Entries kept in the content-addressed cache.
    pub cache_capacity: usize,
}

impl EmbeddingConfig {
    /// Helper startup bound as a `Duration`.
    #[must_use]
    pub const fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    /// Per-call bound as a `Duration`.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// LLM pipeline configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Endpoint base URL (`POST {base}/api/generate`, `{base}/api/chat`).
    pub endpoint: String,
    /// Model name.
    pub model: String,
    /// Request timeout in seconds. CPU-only inference is slow; the default
    /// is deliberately generous.
    pub timeout_secs: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Retries for structured extraction.
    pub extraction_retries: u32,
}

/// Claim extraction configuration.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Claims below this confidence are dropped.
    pub min_confidence: f32,
    /// Levenshtein distance at or below which two claims are duplicates.
    pub dedup_distance: usize,
    /// Sections extracted concurrently.
    pub concurrency: usize,
}

/// Conflict detection configuration.
#[derive(Debug, Clone)]
pub struct ConflictConfig {
    /// Cosine similarity above which the semantic-opposition signal is
    /// considered.
    pub semantic_threshold: f32,
    /// Pairs below this overall strength are dropped.
    pub min_strength: f32,
}

/// Merge engine configuration.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Average-link clustering cutoff: merging stops once the best
    /// cluster-pair similarity drops below this.
    pub cluster_cutoff: f32,
    /// Conflicts below this strength are silently resolved.
    pub auto_resolve_below: f32,
    /// Conflicts above this strength are left for human review.
    pub require_human_above: f32,
}

/// Query engine configuration.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Default number of source documents returned.
    pub max_sources: usize,
    /// Self-consistency samples for claim verification.
    pub verification_samples: usize,
}

/// Entity graph configuration.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Whether entity graph building is enabled at all. When false the
    /// graph store is never contacted.
    pub enabled: bool,
    /// Path to the graph SQLite database.
    pub db_path: PathBuf,
}

/// Server lifecycle configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bound on draining in-flight calls at shutdown, in seconds.
    pub drain_timeout_secs: u64,
    /// Bound on waiting for the embedding helper to exit after EOF.
    pub helper_shutdown_secs: u64,
}

impl Default for DoctrineConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            storage: StorageConfig {
                db_path: data_dir.join("doctrine.db"),
            },
            embedding: EmbeddingConfig {
                helper_command: None,
                model: "all-MiniLM-L6-v2".to_string(),
                dimensions: 384,
                batch_size: 32,
                init_timeout_secs: 60,
                call_timeout_secs: 30,
                fallback_endpoint: "http://localhost:11434".to_string(),
                cache_capacity: 4096,
            },
            llm: LlmConfig {
                endpoint: "http://localhost:11434".to_string(),
                model: "llama3.2".to_string(),
                timeout_secs: 600,
                connect_timeout_ms: 3_000,
                extraction_retries: 3,
            },
            extraction: ExtractionConfig {
                min_confidence: 0.3,
                dedup_distance: 2,
                concurrency: 4,
            },
            conflict: ConflictConfig {
                semantic_threshold: 0.75,
                min_strength: 0.3,
            },
            merge: MergeConfig {
                cluster_cutoff: 0.80,
                auto_resolve_below: 0.3,
                require_human_above: 0.9,
            },
            query: QueryConfig {
                max_sources: 5,
                verification_samples: 3,
            },
            graph: GraphConfig {
                enabled: true,
                db_path: data_dir.join("graph.db"),
            },
            server: ServerConfig {
                drain_timeout_secs: 10,
                helper_shutdown_secs: 5,
            },
        }
    }
}

impl DoctrineConfig {
    /// Loads configuration: defaults, then the TOML file (if any), then
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if an explicitly given config file
    /// cannot be read or parsed. Missing default-location files are not an
    /// error.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = explicit_path {
            let file = FileConfig::read(path)?;
            config.apply_file(file);
        } else if let Some(path) = default_config_paths().into_iter().find(|p| p.exists()) {
            match FileConfig::read(&path) {
                Ok(file) => config.apply_file(file),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file"),
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(s) = file.storage {
            if let Some(p) = s.db_path {
                self.storage.db_path = p;
            }
        }
        if let Some(e) = file.embedding {
            if let Some(v) = e.helper_command {
                self.embedding.helper_command = Some(v);
            }
            if let Some(v) = e.model {
                self.embedding.model = v;
            }
            if let Some(v) = e.dimensions {
                self.embedding.dimensions = v;
            }
            if let Some(v) = e.batch_size {
                self.embedding.batch_size = v;
            }
            if let Some(v) = e.init_timeout_secs {
                self.embedding.init_timeout_secs = v;
            }
            if let Some(v) = e.call_timeout_secs {
                self.embedding.call_timeout_secs = v;
            }
            if let Some(v) = e.fallback_endpoint {
                self.embedding.fallback_endpoint = v;
            }
        }
        if let Some(l) = file.llm {
            if let Some(v) = l.endpoint {
                self.llm.endpoint = v;
            }
            if let Some(v) = l.model {
                self.llm.model = v;
            }
            if let Some(v) = l.timeout_secs {
                self.llm.timeout_secs = v;
            }
            if let Some(v) = l.connect_timeout_ms {
                self.llm.connect_timeout_ms = v;
            }
        }
        if let Some(g) = file.graph {
            if let Some(v) = g.enabled {
                self.graph.enabled = v;
            }
            if let Some(v) = g.db_path {
                self.graph.db_path = v;
            }
        }
        if let Some(m) = file.merge {
            if let Some(v) = m.cluster_cutoff {
                self.merge.cluster_cutoff = v;
            }
            if let Some(v) = m.auto_resolve_below {
                self.merge.auto_resolve_below = v;
            }
            if let Some(v) = m.require_human_above {
                self.merge.require_human_above = v;
            }
        }
    }

    /// Applies `DOCTRINE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_string("DOCTRINE_DB_PATH") {
            self.storage.db_path = PathBuf::from(v);
        }
        if let Some(v) = env_string("DOCTRINE_EMBED_HELPER") {
            self.embedding.helper_command = Some(v);
        }
        if let Some(v) = env_string("DOCTRINE_EMBED_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = env_parse::<usize>("DOCTRINE_EMBED_DIMENSIONS") {
            self.embedding.dimensions = v;
        }
        if let Some(v) = env_parse::<usize>("DOCTRINE_EMBED_BATCH_SIZE") {
            self.embedding.batch_size = v;
        }
        if let Some(v) = env_string("DOCTRINE_EMBED_FALLBACK_ENDPOINT") {
            self.embedding.fallback_endpoint = v;
        }
        if let Some(v) = env_string("DOCTRINE_LLM_ENDPOINT") {
            self.llm.endpoint = v;
        }
        if let Some(v) = env_string("DOCTRINE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = env_parse::<u64>("DOCTRINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = v;
        }
        if let Some(v) = env_parse::<bool>("DOCTRINE_GRAPH_ENABLED") {
            self.graph.enabled = v;
        }
        if let Some(v) = env_string("DOCTRINE_GRAPH_DB_PATH") {
            self.graph.db_path = PathBuf::from(v);
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "doctrine", "doctrine")
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf())
}

fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("doctrine.toml")];
    if let Some(dirs) = directories::ProjectDirs::from("dev", "doctrine", "doctrine") {
        paths.push(dirs.config_dir().join("config.toml"));
    }
    paths
}

/// On-disk TOML shape; every field optional so partial files layer over
/// the defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    storage: Option<FileStorage>,
    embedding: Option<FileEmbedding>,
    llm: Option<FileLlm>,
    graph: Option<FileGraph>,
    merge: Option<FileMerge>,
}

#[derive(Debug, Default, Deserialize)]
struct FileStorage {
    db_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileEmbedding {
    helper_command: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
    batch_size: Option<usize>,
    init_timeout_secs: Option<u64>,
    call_timeout_secs: Option<u64>,
    fallback_endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileLlm {
    endpoint: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    connect_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileGraph {
    enabled: Option<bool>,
    db_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct FileMerge {
    cluster_cutoff: Option<f32>,
    auto_resolve_below: Option<f32>,
    require_human_above: Option<f32>,
}

impl FileConfig {
    fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Validation(format!("config file {}: {e}", path.display()))
        })?;
        toml::from_str(&raw)
            .map_err(|e| Error::Validation(format!("config file {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DoctrineConfig::default();
        assert_eq!(config.embedding.dimensions, 384);
        assert_eq!(config.embedding.batch_size, 32);
        assert_eq!(config.llm.timeout_secs, 600);
        assert!((config.merge.cluster_cutoff - 0.80).abs() < f32::EPSILON);
        assert!((config.conflict.semantic_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.query.max_sources, 5);
        assert!(config.graph.enabled);
    }

    #[test]
    fn test_file_layering() {
        let mut config = DoctrineConfig::default();
        let file: FileConfig = toml::from_str(
            r#"
            [embedding]
            dimensions = 768
            model = "nomic-embed-text"

            [merge]
            cluster_cutoff = 0.9
            "#,
        )
        .unwrap();
        config.apply_file(file);

        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.embedding.model, "nomic-embed-text");
        assert!((config.merge.cluster_cutoff - 0.9).abs() < f32::EPSILON);
        // Untouched fields keep their defaults.
        assert_eq!(config.embedding.batch_size, 32);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = DoctrineConfig::load(Some(Path::new("/nonexistent/doctrine.toml")));
        assert!(result.is_err());
    }
}
