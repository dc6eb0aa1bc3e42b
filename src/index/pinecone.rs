//! Pinecone-backed [`SemanticIndex`].
//!
//! Control plane (`https://api.pinecone.io`) is used once at startup to look
//! up the index host, creating a serverless index when none exists. All
//! reads and writes then go to the data-plane host:
//!
//! - `GET  /vectors/fetch?ids=..` for existence checks
//! - `POST /vectors/upsert`
//! - `POST /query` with `includeMetadata`
//!
//! Requires `PINECONE_API_KEY`.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::config::IndexConfig;
use crate::error::{ResolveError, ResolveResult};
use crate::http;
use crate::models::IndexMetadata;

use super::{IndexMatch, SemanticIndex};

const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";
const API_VERSION: &str = "2024-07";
const READY_POLL_ATTEMPTS: u32 = 30;

pub struct PineconeIndex {
    base_url: String,
    namespace: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl PineconeIndex {
    /// Connect to the configured index, creating it if it does not exist.
    pub async fn connect(config: &IndexConfig, dims: usize) -> anyhow::Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY")
            .map_err(|_| anyhow::anyhow!("PINECONE_API_KEY environment variable not set"))?;
        let client = http::client(config.timeout_secs)?;

        let host = match &config.host {
            Some(host) => host.clone(),
            None => describe_or_create(&client, &api_key, config, dims)
                .await
                .with_context(|| format!("Failed to open Pinecone index '{}'", config.name))?,
        };

        Ok(Self {
            base_url: data_plane_url(&host),
            namespace: config.namespace.clone().unwrap_or_default(),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        authorized(
            self.client.request(method, format!("{}{}", self.base_url, path)),
            &self.api_key,
        )
    }
}

fn authorized(builder: reqwest::RequestBuilder, api_key: &str) -> reqwest::RequestBuilder {
    builder
        .header("Api-Key", api_key)
        .header("X-Pinecone-API-Version", API_VERSION)
}

fn data_plane_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Look up the index host, creating the index on 404 and waiting for it to
/// report ready.
async fn describe_or_create(
    client: &reqwest::Client,
    api_key: &str,
    config: &IndexConfig,
    dims: usize,
) -> ResolveResult<String> {
    let describe_url = format!("{}/indexes/{}", CONTROL_PLANE_URL, config.name);
    let describe = || authorized(client.get(&describe_url), api_key);

    let mut description = match http::send_json("Pinecone describe index", config.max_retries, describe).await {
        Ok(json) => json,
        Err(ResolveError::NotFound(_)) => {
            info!(index = %config.name, dims, "creating Pinecone index");
            let body = json!({
                "name": config.name,
                "dimension": dims,
                "metric": config.metric,
                "spec": { "serverless": { "cloud": config.cloud, "region": config.region } },
            });
            let create_url = format!("{}/indexes", CONTROL_PLANE_URL);
            http::send_json("Pinecone create index", config.max_retries, || {
                authorized(client.post(&create_url), api_key).json(&body)
            })
            .await?
        }
        Err(e) => return Err(e),
    };

    for _ in 0..READY_POLL_ATTEMPTS {
        if is_ready(&description) {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        description = http::send_json("Pinecone describe index", config.max_retries, describe).await?;
    }
    if !is_ready(&description) {
        return Err(ResolveError::transport(format!(
            "Pinecone index '{}' did not become ready",
            config.name
        )));
    }

    description
        .get("host")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ResolveError::validation("Pinecone index description has no host"))
}

fn is_ready(description: &Value) -> bool {
    description
        .pointer("/status/ready")
        .and_then(Value::as_bool)
        // older API versions omit status
        .unwrap_or_else(|| description.get("host").is_some())
}

#[async_trait]
impl SemanticIndex for PineconeIndex {
    async fn exists(&self, id: &str) -> ResolveResult<bool> {
        let json = http::send_json("Pinecone fetch", self.max_retries, || {
            self.request(reqwest::Method::GET, "/vectors/fetch")
                .query(&[("ids", id), ("namespace", self.namespace.as_str())])
        })
        .await?;
        Ok(json
            .get("vectors")
            .and_then(Value::as_object)
            .is_some_and(|vectors| vectors.contains_key(id)))
    }

    async fn upsert(&self, id: &str, vector: &[f32], metadata: &IndexMetadata) -> ResolveResult<()> {
        let body = json!({
            "vectors": [{ "id": id, "values": vector, "metadata": metadata }],
            "namespace": self.namespace,
        });
        http::send_json("Pinecone upsert", self.max_retries, || {
            self.request(reqwest::Method::POST, "/vectors/upsert").json(&body)
        })
        .await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> ResolveResult<Vec<IndexMatch>> {
        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
            "namespace": self.namespace,
        });
        let json = http::send_json("Pinecone query", self.max_retries, || {
            self.request(reqwest::Method::POST, "/query").json(&body)
        })
        .await?;
        parse_matches(&json)
    }
}

/// Parse the `matches` array of a query response.
fn parse_matches(json: &Value) -> ResolveResult<Vec<IndexMatch>> {
    let matches = json
        .get("matches")
        .and_then(Value::as_array)
        .ok_or_else(|| ResolveError::validation("Pinecone query response has no matches array"))?;

    matches
        .iter()
        .map(|m| {
            let id = m
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| ResolveError::validation("Pinecone match without id"))?;
            Ok(IndexMatch {
                id: id.to_string(),
                score: m.get("score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                metadata: m
                    .get("metadata")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default(),
            })
        })
        .collect()
}
