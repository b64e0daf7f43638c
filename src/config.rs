//! Configuration parsing and validation.
//!
//! The engine is configured via a TOML file (default: `config/deals.toml`).
//! The config defines snapshot paths, the embedding backend, the embedding
//! cache location, and retrieval tuning.
//!
//! Scoring constants (field weights, fusion weights, cutoff ratios) are
//! deliberately not configurable: they are part of the ranking contract and
//! live as constants next to the code that applies them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Input snapshot locations.
#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Deals snapshot (JSON array of offer objects).
    pub deals_path: PathBuf,
    /// Qualifying-products snapshot (JSON array of product objects).
    pub products_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Backend: `local` (fastembed), `ollama`, `mock`, or `disabled`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Vector dimensionality. The scorers assume unit vectors of this size.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ollama base URL. Ignored by other backends.
    #[serde(default)]
    pub url: Option<String>,
    /// Embedding cache file, rewritten whenever the snapshots change.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
            cache_path: default_cache_path(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("data/embeddings.bin")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Maximum number of deals returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Batch size for the streaming result API.
    #[serde(default = "default_stream_batch_size")]
    pub stream_batch_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            stream_batch_size: default_stream_batch_size(),
        }
    }
}

fn default_top_k() -> usize {
    40
}
fn default_stream_batch_size() -> usize {
    5
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.stream_batch_size < 1 {
        anyhow::bail!("retrieval.stream_batch_size must be >= 1");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "local" | "ollama" | "mock" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be local, ollama, mock, or disabled.",
            other
        ),
    }

    Ok(config)
}
