//! TOML configuration.
//!
//! One [`Config`] is built at process start and handed by reference to each
//! component constructor. Secrets stay in the environment
//! (`OPENAI_API_KEY`, `FRED_API_KEY`, `PINECONE_API_KEY`).
//!
//! Every section is optional; a minimal file for a fully-featured setup:
//!
//! ```toml
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [oracle]
//! provider = "openai"
//!
//! [index]
//! provider = "pinecone"
//! name = "fred-search"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::http;
use crate::region::DEFAULT_REGION;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolutionConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_region")]
    pub default_region: String,
    /// Run enrichment-and-store on a spawned task instead of awaiting it.
    #[serde(default)]
    pub background_enrichment: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            default_region: default_region(),
            background_enrichment: false,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            max_retries: default_embedding_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Outer bound on one embedding call, retries included.
    pub fn call_budget(&self) -> Duration {
        http::call_budget(self.timeout_secs, self.max_retries)
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_provider")]
    pub provider: String,
    /// JSON snapshot file for the memory backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_index_name")]
    pub name: String,
    /// Pinecone data-plane host; looked up (or the index created) when unset.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_cloud_region")]
    pub region: String,
    #[serde(default = "default_metric")]
    pub metric: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            path: None,
            name: default_index_name(),
            host: None,
            namespace: None,
            cloud: default_cloud(),
            region: default_cloud_region(),
            metric: default_metric(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl IndexConfig {
    /// Outer bound on one index call, retries included.
    pub fn call_budget(&self) -> Duration {
        http::call_budget(self.timeout_secs, self.max_retries)
    }
}

fn default_index_provider() -> String {
    "memory".to_string()
}
fn default_index_name() -> String {
    "fred-search".to_string()
}
fn default_cloud() -> String {
    "aws".to_string()
}
fn default_cloud_region() -> String {
    "us-east-1".to_string()
}
fn default_metric() -> String {
    "cosine".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_provider")]
    pub provider: String,
    #[serde(default = "default_catalog_url")]
    pub base_url: String,
    /// Raw hits requested from the catalog per search.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Leading hits turned into candidates for ranking.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            provider: default_catalog_provider(),
            base_url: default_catalog_url(),
            search_limit: default_search_limit(),
            candidate_limit: default_candidate_limit(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CatalogConfig {
    /// Outer bound on one catalog call, retries included.
    pub fn call_budget(&self) -> Duration {
        http::call_budget(self.timeout_secs, self.max_retries)
    }
}

fn default_catalog_provider() -> String {
    "fred".to_string()
}
fn default_catalog_url() -> String {
    "https://api.stlouisfed.org/fred".to_string()
}
fn default_search_limit() -> usize {
    500
}
fn default_candidate_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct OracleConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_oracle_model(),
            temperature: 0.0,
            max_retries: default_max_retries(),
            timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

impl OracleConfig {
    /// Outer bound on one oracle call, retries included.
    pub fn call_budget(&self) -> Duration {
        http::call_budget(self.timeout_secs, self.max_retries)
    }
}

fn default_oracle_model() -> String {
    "gpt-4o".to_string()
}
fn default_oracle_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Read, parse and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate resolution
    if config.resolution.top_k == 0 {
        anyhow::bail!("resolution.top_k must be >= 1");
    }

    // Validate catalog
    if config.catalog.candidate_limit == 0 {
        anyhow::bail!("catalog.candidate_limit must be >= 1");
    }
    if config.catalog.search_limit < config.catalog.candidate_limit {
        anyhow::bail!("catalog.search_limit must be >= catalog.candidate_limit");
    }
    if config.catalog.search_limit > 1000 {
        anyhow::bail!("catalog.search_limit must be <= 1000");
    }
    if config.catalog.provider != "fred" {
        anyhow::bail!(
            "Unknown catalog provider: '{}'. Must be fred.",
            config.catalog.provider
        );
    }

    // Validate oracle
    if !(0.0..=2.0).contains(&config.oracle.temperature) {
        anyhow::bail!("oracle.temperature must be in [0.0, 2.0]");
    }
    match config.oracle.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown oracle provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Validate index
    match config.index.provider.as_str() {
        "memory" => {}
        "pinecone" => {
            if !config.embedding.is_enabled() {
                anyhow::bail!("index.provider 'pinecone' requires an enabled embedding provider");
            }
        }
        other => anyhow::bail!(
            "Unknown index provider: '{}'. Must be memory or pinecone.",
            other
        ),
    }

    Ok(config)
}
