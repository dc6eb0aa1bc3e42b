//! End-to-end resolution: raw query in, metadata and selection out.
//!
//! [`SeriesResolver`] owns one [`QueryMetadataExtractor`] and one
//! [`SeriesResolutionEngine`], wired once from [`Config`]. The CLI and the
//! HTTP server both go through it.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::catalog::{create_catalog, CatalogSearch, CatalogSearchClient};
use crate::config::Config;
use crate::dates::{Clock, SystemClock};
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::index::{create_index, SemanticIndex, SemanticIndexClient};
use crate::models::{QueryMetadata, SeriesSelection};
use crate::oracle::{create_oracle, ReasoningOracle};
use crate::query_metadata::QueryMetadataExtractor;
use crate::resolve::{EngineSettings, SeriesResolutionEngine};
use crate::seed::{seed_index, SeedReport, CORE_SERIES};

/// Result of resolving one raw query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub metadata: QueryMetadata,
    pub selection: SeriesSelection,
}

/// Collaborators the pipeline is assembled from.
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn SemanticIndex>,
    pub catalog: Arc<dyn CatalogSearch>,
    pub oracle: Arc<dyn ReasoningOracle>,
    pub clock: Arc<dyn Clock>,
}

pub struct SeriesResolver {
    extractor: QueryMetadataExtractor,
    engine: SeriesResolutionEngine,
}

impl SeriesResolver {
    /// Build every backend named in `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let collaborators = Collaborators {
            index: create_index(config, embedder.as_ref()).await?,
            embedder,
            catalog: create_catalog(&config.catalog)?,
            oracle: create_oracle(&config.oracle)?,
            clock: Arc::new(SystemClock),
        };
        info!(
            embedding = %collaborators.embedder.model_name(),
            index = %config.index.provider,
            catalog = %config.catalog.provider,
            oracle = %config.oracle.provider,
            "series resolver ready"
        );
        Ok(Self::with_collaborators(config, collaborators))
    }

    /// Wire the pipeline around caller-supplied collaborators.
    pub fn with_collaborators(config: &Config, parts: Collaborators) -> Self {
        let index = Arc::new(
            SemanticIndexClient::new(parts.embedder, parts.index, config.index.call_budget())
                .with_embed_timeout(config.embedding.call_budget()),
        );
        let catalog = Arc::new(CatalogSearchClient::new(parts.catalog, &config.catalog));
        let extractor = QueryMetadataExtractor::new(
            parts.oracle.clone(),
            parts.clock,
            config.resolution.default_region.clone(),
            config.oracle.call_budget(),
        );
        let engine = SeriesResolutionEngine::new(
            index,
            catalog,
            parts.oracle,
            EngineSettings::from_config(config),
        );
        Self { extractor, engine }
    }

    /// Extract metadata from `raw_query`, then resolve its concept.
    pub async fn resolve_query(&self, raw_query: &str) -> Resolution {
        let metadata = self.extractor.extract(raw_query).await;
        let selection = self
            .engine
            .resolve(raw_query, &metadata.economic_concept, &metadata.region)
            .await;
        Resolution {
            metadata,
            selection,
        }
    }

    /// Seed the semantic index with the core series.
    pub async fn seed(&self) -> SeedReport {
        seed_index(&self.engine.enricher(), CORE_SERIES).await
    }
}
