//! Configuration module for the multimodal search engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.vindex/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the binary)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `VINDEX_` and use double
//! underscores to separate nested levels:
//! - `VINDEX_STORE__URI=./images.db` sets `store.uri`
//! - `VINDEX_INDEXING__BATCH_SIZE=64` sets `indexing.batch_size`
//! - `VINDEX_SEARCH__THRESHOLD=0.25` sets `search.threshold`

use crate::engine::IdStrategy;
use crate::error::{VindexError, VindexResult};
use crate::vector::Metric;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the workspace configuration.
pub const CONFIG_DIR: &str = ".vindex";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Global debug mode, forces debug-level logging
    #[serde(default = "default_false")]
    pub debug: bool,

    /// Log filter used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    /// HTTP server settings for `vindex serve`
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// Registry name of the encoder model
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Where model weights are downloaded (defaults to the user cache dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Text context length in tokens; longer input is truncated on the right
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default = "default_false")]
    pub show_download_progress: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Embedded store directory. Mutually exclusive with `host`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<PathBuf>,

    /// Remote vindex server host. Mutually exclusive with `uri`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub metric: Metric,

    /// Request timeout for the remote backend
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Images encoded and inserted per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Descend into subdirectories when indexing a folder
    #[serde(default = "default_false")]
    pub recursive: bool,

    /// Accepted file extensions, matched case-insensitively
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default)]
    pub id_strategy: IdStrategy,

    /// Number of threads used for scoring in the embedded store
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity, inclusive
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Bind address for `vindex serve`
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// Largest accepted request body in bytes. Insert batches are sent as
    /// one JSON body, so this bounds the remote batch size.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Backend selected by the store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Embedded { uri: PathBuf },
    Remote { host: String, port: u16 },
}

fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_model_name() -> String {
    "clip-vit-b-32".to_string()
}
fn default_max_length() -> usize {
    77
}
fn default_port() -> u16 {
    19530
}
fn default_collection() -> String {
    "clip_images".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_batch_size() -> usize {
    32
}
pub fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "bmp", "webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_top_k() -> usize {
    10
}
fn default_threshold() -> f32 {
    0.0
}
fn default_bind_address() -> String {
    "127.0.0.1:19530".to_string()
}
pub fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

/// Embedded store location used when neither `uri` nor `host` is set.
pub const DEFAULT_STORE_URI: &str = "vindex.db";

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            debug: false,
            log_level: default_log_level(),
            model: ModelConfig::default(),
            store: StoreConfig::default(),
            indexing: IndexingConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            cache_dir: None,
            max_length: default_max_length(),
            show_download_progress: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            host: None,
            port: default_port(),
            collection: default_collection(),
            metric: Metric::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            recursive: false,
            extensions: default_extensions(),
            id_strategy: IdStrategy::default(),
            parallel_threads: default_parallel_threads(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_threshold(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ModelConfig {
    /// Cache directory for model weights.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("vindex")
                .join("models")
        })
    }
}

impl IndexingConfig {
    /// Recursion for one run: an explicit CLI choice wins over the config.
    pub fn recursive_with(&self, flag: Option<bool>) -> bool {
        flag.unwrap_or(self.recursive)
    }
}

impl StoreConfig {
    /// Resolves which backend these settings address.
    pub fn backend(&self) -> VindexResult<StoreBackend> {
        match (&self.uri, &self.host) {
            (Some(_), Some(_)) => Err(VindexError::config(
                "store.uri and store.host are mutually exclusive; set only one",
            )),
            (None, Some(host)) if host.trim().is_empty() => {
                Err(VindexError::config("store.host cannot be empty"))
            }
            (None, Some(host)) => Ok(StoreBackend::Remote {
                host: host.clone(),
                port: self.port,
            }),
            (Some(uri), None) => Ok(StoreBackend::Embedded { uri: uri.clone() }),
            (None, None) => Ok(StoreBackend::Embedded {
                uri: PathBuf::from(DEFAULT_STORE_URI),
            }),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file, still layering env vars on top
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nesting, single underscore stays in field names
            .merge(Env::prefixed("VINDEX_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.vindex/settings.toml` searching from the current directory up to root
    pub fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> VindexResult<()> {
        self.store.backend()?;
        if self.store.collection.trim().is_empty() {
            return Err(VindexError::config("store.collection cannot be empty"));
        }
        if self.indexing.batch_size == 0 {
            return Err(VindexError::config("indexing.batch_size must be at least 1"));
        }
        if self.indexing.parallel_threads == 0 {
            return Err(VindexError::config(
                "indexing.parallel_threads must be at least 1",
            ));
        }
        if !self.search.threshold.is_finite() {
            return Err(VindexError::config("search.threshold must be a finite number"));
        }
        if self.model.max_length == 0 {
            return Err(VindexError::config("model.max_length must be at least 1"));
        }
        if self.server.max_body_bytes == 0 {
            return Err(VindexError::config("server.max_body_bytes must be at least 1"));
        }
        Ok(())
    }

    /// Extensions lowercased with any leading dot removed.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.indexing
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> VindexResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| VindexError::io(parent, e))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| VindexError::config(format!("cannot serialize settings: {e}")))?;
        std::fs::write(path, toml_string).map_err(|e| VindexError::io(path, e))
    }

    /// Effective settings rendered as TOML
    pub fn to_toml(&self) -> VindexResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| VindexError::config(format!("cannot serialize settings: {e}")))
    }

    /// Create a documented settings file under `dir/.vindex/`
    pub fn init_config_file(dir: impl AsRef<Path>, force: bool) -> VindexResult<PathBuf> {
        let config_dir = dir.as_ref().join(CONFIG_DIR);
        let config_path = config_dir.join("settings.toml");

        if !force && config_path.exists() {
            return Err(VindexError::config(format!(
                "configuration file already exists at {}. Use --force to overwrite",
                config_path.display()
            )));
        }

        std::fs::create_dir_all(&config_dir).map_err(|e| VindexError::io(&config_dir, e))?;

        let template = format!(
            r#"# vindex configuration file

# Version of the configuration schema
version = 1

# Global debug mode (forces debug logging)
debug = false

# Log filter when RUST_LOG is unset: error, warn, info, debug, trace
log_level = "warn"

[model]
# Encoder model: "clip-vit-b-32" (512-d) or "nomic-embed-v1.5" (768-d)
name = "clip-vit-b-32"

# Text context length in tokens, longer queries are truncated
max_length = 77

# Show a progress bar while model weights download
show_download_progress = false

# Where model weights are cached (defaults to the user cache directory)
# cache_dir = "/path/to/models"

[store]
# Embedded store directory. Set either uri or host, not both.
uri = "vindex.db"

# Remote vindex server (see `vindex serve`)
# host = "127.0.0.1"
port = 19530

# Collection name. A collection keeps the dimension and metric it was created with.
collection = "clip_images"

# Similarity metric: "cosine" or "ip"
metric = "cosine"

# Remote request timeout in seconds
timeout_secs = 30

[indexing]
# Images encoded and inserted per batch
batch_size = 32

# Descend into subdirectories
recursive = false

# Accepted image extensions (case-insensitive)
extensions = ["jpg", "jpeg", "png", "bmp", "webp"]

# Id assignment: "sequential" (dense ids from the current count)
# or "content-hash" (derived from file bytes, safe across processes)
id_strategy = "sequential"

# Scoring threads for the embedded store (defaults to CPU count)
# parallel_threads = {}

[search]
# Maximum number of results
top_k = 10

# Minimum cosine similarity, inclusive (-1.0 to 1.0)
threshold = 0.0

[server]
# Bind address for `vindex serve`
bind = "127.0.0.1:19530"

# Largest accepted request body in bytes (64 MiB)
max_body_bytes = 67108864
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template).map_err(|e| VindexError::io(&config_path, e))?;
        Ok(config_path)
    }
}
