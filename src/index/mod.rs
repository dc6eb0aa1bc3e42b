//! Semantic index abstraction.
//!
//! The [`SemanticIndex`] trait is the approximate nearest-neighbour store the
//! resolver caches enriched series in, keyed by
//! [`embedding_id`](crate::models::CandidateRecord::embedding_id). Backends:
//!
//! | Config Value | Backend |
//! |-------------|---------|
//! | `"memory"` | [`memory::InMemoryIndex`], optionally snapshotted to a JSON file |
//! | `"pinecone"` | [`pinecone::PineconeIndex`] |
//!
//! [`SemanticIndexClient`] pairs an index with an [`EmbeddingProvider`] and
//! speaks in [`CandidateRecord`]s.
//!
//! Writes follow check-then-act: callers test [`SemanticIndex::exists`] and
//! upsert once. Concurrent discoverers of the same series may both upsert;
//! the key and content are identical so the index still converges to one
//! entry per series.

pub mod memory;
pub mod pinecone;

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use tracing::warn;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{with_timeout, ResolveResult};
use crate::models::{embedding_id_for, CandidateRecord, IndexMetadata};

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub id: String,
    /// Similarity score; higher is closer.
    pub score: f32,
    pub metadata: IndexMetadata,
}

/// Abstract vector store.
///
/// All operations are async (via `async-trait`). In-memory implementations
/// return immediately-ready futures.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Whether an entry with this key exists.
    async fn exists(&self, id: &str) -> ResolveResult<bool>;

    /// Insert or replace the entry for `id`.
    async fn upsert(&self, id: &str, vector: &[f32], metadata: &IndexMetadata) -> ResolveResult<()>;

    /// Top-`top_k` entries nearest to `vector`, best first.
    async fn query(&self, vector: &[f32], top_k: usize) -> ResolveResult<Vec<IndexMatch>>;
}

/// A reconstructed record with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub record: CandidateRecord,
    pub score: f32,
}

/// Record-level access to the semantic index.
///
/// Every index call is bounded by `timeout`, every embedding call by
/// `embed_timeout` (the same value unless set with
/// [`with_embed_timeout`](Self::with_embed_timeout)).
pub struct SemanticIndexClient {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SemanticIndex>,
    timeout: Duration,
    embed_timeout: Duration,
}

impl SemanticIndexClient {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SemanticIndex>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            timeout,
            embed_timeout: timeout,
        }
    }

    pub fn with_embed_timeout(mut self, embed_timeout: Duration) -> Self {
        self.embed_timeout = embed_timeout;
        self
    }

    /// Whether a record for `series_id` is already stored.
    pub async fn series_exists(&self, series_id: &str) -> ResolveResult<bool> {
        let id = embedding_id_for(series_id);
        with_timeout(self.timeout, "semantic index lookup", self.index.exists(&id)).await
    }

    /// Embed `text` and return the nearest stored records.
    ///
    /// Entries whose metadata cannot be decoded are skipped with a warning.
    pub async fn search_series(&self, text: &str, top_k: usize) -> ResolveResult<Vec<ScoredCandidate>> {
        let vector = with_timeout(self.embed_timeout, "embedding", self.embedder.embed(text)).await?;
        let matches = with_timeout(
            self.timeout,
            "semantic index query",
            self.index.query(&vector, top_k),
        )
        .await?;

        Ok(matches
            .into_iter()
            .filter_map(|m| match CandidateRecord::from_index_metadata(&m.metadata) {
                Ok(record) => Some(ScoredCandidate {
                    record,
                    score: m.score,
                }),
                Err(e) => {
                    warn!(id = %m.id, error = %e, "skipping undecodable index entry");
                    None
                }
            })
            .collect())
    }

    /// Embed the record's canonical text and upsert it under its embedding id.
    pub async fn store_series(&self, record: &CandidateRecord) -> ResolveResult<()> {
        let text = record.to_embedding_text();
        let vector = with_timeout(self.embed_timeout, "embedding", self.embedder.embed(&text)).await?;
        with_timeout(
            self.timeout,
            "semantic index upsert",
            self.index
                .upsert(&record.embedding_id(), &vector, &record.to_index_metadata()),
        )
        .await
    }
}

/// Create the configured [`SemanticIndex`].
///
/// The Pinecone backend resolves (or creates) its index during construction,
/// sized to the dimension of `embedder`.
pub async fn create_index(
    config: &Config,
    embedder: &dyn EmbeddingProvider,
) -> anyhow::Result<Arc<dyn SemanticIndex>> {
    match config.index.provider.as_str() {
        "memory" => match &config.index.path {
            Some(path) => Ok(Arc::new(memory::InMemoryIndex::open(path).await?)),
            None => Ok(Arc::new(memory::InMemoryIndex::new())),
        },
        "pinecone" => {
            if embedder.dims() == 0 {
                bail!(
                    "index.provider 'pinecone' needs embeddings; model '{}' has no dimension",
                    embedder.model_name()
                );
            }
            Ok(Arc::new(
                pinecone::PineconeIndex::connect(&config.index, embedder.dims()).await?,
            ))
        }
        other => bail!("Unknown index provider: {}", other),
    }
}
