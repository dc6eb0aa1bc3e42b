//! Catalog search over the external series registry.
//!
//! [`CatalogSearch`] is the raw keyword-search seam; [`FredCatalog`] backs it
//! with the FRED web API. [`CatalogSearchClient`] is what the resolver uses:
//! it bounds each call with a timeout and turns the leading hits into
//! minimally-populated [`CandidateRecord`]s.
//!
//! FRED's `series/search` orders results by its own search rank unless an
//! `order_by` is given; no re-ranking happens here.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::CatalogConfig;
use crate::error::{with_timeout, ResolveError, ResolveResult};
use crate::http;
use crate::models::{CandidateRecord, CatalogHit};

/// Keyword search over the catalog.
#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// Up to `limit` hits in the catalog's own order. An empty result is not
    /// an error.
    async fn search(&self, query: &str, limit: usize) -> ResolveResult<Vec<CatalogHit>>;

    /// Full record of one series; [`ResolveError::NotFound`] if unknown.
    async fn series_info(&self, series_id: &str) -> ResolveResult<CatalogHit>;
}

// ============ FRED ============

/// FRED web API backend. Requires `FRED_API_KEY`.
pub struct FredCatalog {
    base_url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl FredCatalog {
    pub fn new(config: &CatalogConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("FRED_API_KEY")
            .map_err(|_| anyhow::anyhow!("FRED_API_KEY environment variable not set"))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl CatalogSearch for FredCatalog {
    async fn search(&self, query: &str, limit: usize) -> ResolveResult<Vec<CatalogHit>> {
        let url = format!("{}/series/search", self.base_url);
        let limit = limit.to_string();
        let json = http::send_json("FRED series search", self.max_retries, || {
            self.client.get(&url).query(&[
                ("search_text", query),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
                ("limit", limit.as_str()),
            ])
        })
        .await?;
        parse_series_list(&json)
    }

    async fn series_info(&self, series_id: &str) -> ResolveResult<CatalogHit> {
        let url = format!("{}/series", self.base_url);
        let result = http::send_json("FRED series", self.max_retries, || {
            self.client.get(&url).query(&[
                ("series_id", series_id),
                ("api_key", self.api_key.as_str()),
                ("file_type", "json"),
            ])
        })
        .await;

        let json = match result {
            Ok(json) => json,
            // FRED answers an unknown id with 400 "The series does not exist."
            Err(ResolveError::Transport(msg)) if msg.contains("does not exist") => {
                return Err(ResolveError::not_found(format!("series {}", series_id)))
            }
            Err(e) => return Err(e),
        };

        parse_series_list(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| ResolveError::not_found(format!("series {}", series_id)))
    }
}

/// Parse the `seriess` array shared by FRED's series endpoints.
fn parse_series_list(json: &Value) -> ResolveResult<Vec<CatalogHit>> {
    let Some(items) = json.get("seriess") else {
        return Err(ResolveError::validation("FRED response has no 'seriess' field"));
    };
    serde_json::from_value(items.clone())
        .map_err(|e| ResolveError::validation(format!("malformed FRED series list: {}", e)))
}

/// Create the configured [`CatalogSearch`].
pub fn create_catalog(config: &CatalogConfig) -> anyhow::Result<Arc<dyn CatalogSearch>> {
    match config.provider.as_str() {
        "fred" => Ok(Arc::new(FredCatalog::new(config)?)),
        other => bail!("Unknown catalog provider: {}", other),
    }
}

// ============ Client ============

/// Record-level access to the catalog.
pub struct CatalogSearchClient {
    catalog: Arc<dyn CatalogSearch>,
    search_limit: usize,
    candidate_limit: usize,
    timeout: Duration,
}

impl CatalogSearchClient {
    pub fn new(catalog: Arc<dyn CatalogSearch>, config: &CatalogConfig) -> Self {
        Self {
            catalog,
            search_limit: config.search_limit,
            candidate_limit: config.candidate_limit,
            timeout: config.call_budget(),
        }
    }

    /// Search with `search_limit` and mint records from the first
    /// `candidate_limit` hits, in catalog order.
    pub async fn search_candidates(&self, query: &str) -> ResolveResult<Vec<CandidateRecord>> {
        let hits = with_timeout(
            self.timeout,
            "catalog search",
            self.catalog.search(query, self.search_limit),
        )
        .await?;
        Ok(hits
            .iter()
            .take(self.candidate_limit)
            .map(CandidateRecord::from_catalog_hit)
            .collect())
    }

    /// Full catalog record of `series_id`.
    pub async fn series_info(&self, series_id: &str) -> ResolveResult<CatalogHit> {
        with_timeout(
            self.timeout,
            "catalog series lookup",
            self.catalog.series_info(series_id),
        )
        .await
    }
}
