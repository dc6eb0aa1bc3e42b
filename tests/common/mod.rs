//! Deterministic stand-ins for every external collaborator.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use series_resolver::catalog::{CatalogSearch, CatalogSearchClient};
use series_resolver::config::CatalogConfig;
use series_resolver::embedding::EmbeddingProvider;
use series_resolver::error::{ResolveError, ResolveResult};
use series_resolver::index::memory::InMemoryIndex;
use series_resolver::index::{IndexMatch, SemanticIndex, SemanticIndexClient};
use series_resolver::models::{CatalogHit, IndexMetadata};
use series_resolver::oracle::{OutputSchema, ReasoningOracle};
use series_resolver::resolve::{EngineSettings, SeriesResolutionEngine};

// ─── Embedder ───────────────────────────────────────────────────────

/// Hashes words into a small fixed-size vector.
pub struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        16
    }

    async fn embed(&self, text: &str) -> ResolveResult<Vec<f32>> {
        let mut v = vec![0.0f32; 16];
        for word in text.split_whitespace() {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % 16] += 1.0;
        }
        v[0] += 0.01;
        Ok(v)
    }
}

/// Embedder that never answers within any reasonable bound.
pub struct StalledEmbedder;

#[async_trait]
impl EmbeddingProvider for StalledEmbedder {
    fn model_name(&self) -> &str {
        "stalled"
    }

    fn dims(&self) -> usize {
        16
    }

    async fn embed(&self, text: &str) -> ResolveResult<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        HashEmbedder.embed(text).await
    }
}

// ─── Index ──────────────────────────────────────────────────────────

/// In-memory index that counts calls.
#[derive(Default)]
pub struct CountingIndex {
    pub inner: InMemoryIndex,
    pub upserts: AtomicUsize,
    pub exists_calls: AtomicUsize,
    pub queries: AtomicUsize,
}

impl CountingIndex {
    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SemanticIndex for CountingIndex {
    async fn exists(&self, id: &str) -> ResolveResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(id).await
    }

    async fn upsert(&self, id: &str, vector: &[f32], metadata: &IndexMetadata) -> ResolveResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(id, vector, metadata).await
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> ResolveResult<Vec<IndexMatch>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.query(vector, top_k).await
    }
}

// ─── Catalog ────────────────────────────────────────────────────────

/// Fixed hit list; records every search query and lookup.
#[derive(Default)]
pub struct StubCatalog {
    pub hits: Vec<CatalogHit>,
    pub fail_search: bool,
    pub searches: Mutex<Vec<String>>,
    pub lookups: Mutex<Vec<String>>,
}

impl StubCatalog {
    pub fn with_hits(hits: Vec<CatalogHit>) -> Self {
        Self {
            hits,
            ..Default::default()
        }
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogSearch for StubCatalog {
    async fn search(&self, query: &str, limit: usize) -> ResolveResult<Vec<CatalogHit>> {
        self.searches.lock().unwrap().push(query.to_string());
        if self.fail_search {
            return Err(ResolveError::transport("catalog unavailable"));
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn series_info(&self, series_id: &str) -> ResolveResult<CatalogHit> {
        self.lookups.lock().unwrap().push(series_id.to_string());
        self.hits
            .iter()
            .find(|h| h.id == series_id)
            .cloned()
            .ok_or_else(|| ResolveError::not_found(format!("series {}", series_id)))
    }
}

pub fn hit(id: &str, title: &str) -> CatalogHit {
    CatalogHit {
        id: id.to_string(),
        title: title.to_string(),
        notes: Some(format!("{} notes", title)),
        units: Some("Percent".to_string()),
        frequency: Some("Monthly".to_string()),
        seasonal_adjustment: Some("Seasonally Adjusted".to_string()),
        group_id: None,
        last_updated: Some("2024-06-07 07:48:02-05".to_string()),
    }
}

// ─── Oracle ─────────────────────────────────────────────────────────

/// Answers from per-schema queues; an empty queue is a transport failure.
#[derive(Default)]
pub struct ScriptedOracle {
    answers: Mutex<HashMap<String, VecDeque<Value>>>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
    pub instructions: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `answer` for the next request of schema `name`.
    pub fn answer(self, name: &str, answer: Value) -> Self {
        self.answers
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(answer);
        self
    }

    /// Sleep for `delay` before answering each request.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    async fn invoke(&self, instructions: &str, _input: &str, schema: &OutputSchema) -> ResolveResult<Value> {
        self.calls.lock().unwrap().push(schema.name.clone());
        self.instructions.lock().unwrap().push(instructions.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .lock()
            .unwrap()
            .get_mut(&schema.name)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| ResolveError::transport(format!("no scripted {}", schema.name)))
    }
}

pub fn selection(series_id: Option<&str>, confidence: f64, region_match: bool) -> Value {
    json!({
        "series_id": series_id,
        "confidence": confidence,
        "reasoning": "scripted",
        "region_match": region_match,
    })
}

pub fn search_query(query: &str) -> Value {
    json!({ "query": query })
}

pub fn enhancement(category: &str, keywords: &[&str]) -> Value {
    json!({
        "description": format!("{} description", category),
        "common_uses": ["Macro analysis"],
        "related_concepts": ["Business cycle"],
        "keywords": keywords,
        "category": category,
        "region": "US",
    })
}

// ─── Wiring ─────────────────────────────────────────────────────────

pub struct Harness {
    pub index: Arc<CountingIndex>,
    pub catalog: Arc<StubCatalog>,
    pub oracle: Arc<ScriptedOracle>,
    pub index_client: Arc<SemanticIndexClient>,
    pub engine: SeriesResolutionEngine,
}

pub fn harness(catalog: StubCatalog, oracle: ScriptedOracle) -> Harness {
    harness_with(
        Arc::new(HashEmbedder),
        catalog,
        oracle,
        EngineSettings::default(),
    )
}

pub fn harness_with(
    embedder: Arc<dyn EmbeddingProvider>,
    catalog: StubCatalog,
    oracle: ScriptedOracle,
    settings: EngineSettings,
) -> Harness {
    harness_bounded(embedder, catalog, oracle, settings, Duration::from_secs(5))
}

/// Like [`harness_with`], with embedding calls bounded by `embed_timeout`.
pub fn harness_bounded(
    embedder: Arc<dyn EmbeddingProvider>,
    catalog: StubCatalog,
    oracle: ScriptedOracle,
    settings: EngineSettings,
    embed_timeout: Duration,
) -> Harness {
    let index = Arc::new(CountingIndex::default());
    let catalog = Arc::new(catalog);
    let oracle = Arc::new(oracle);
    let index_client = Arc::new(
        SemanticIndexClient::new(embedder, index.clone(), Duration::from_secs(5))
            .with_embed_timeout(embed_timeout),
    );
    let catalog_client = Arc::new(CatalogSearchClient::new(
        catalog.clone(),
        &CatalogConfig::default(),
    ));
    let engine = SeriesResolutionEngine::new(
        index_client.clone(),
        catalog_client,
        oracle.clone(),
        settings,
    );
    Harness {
        index,
        catalog,
        oracle,
        index_client,
        engine,
    }
}
