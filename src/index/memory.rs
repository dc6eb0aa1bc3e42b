//! In-memory [`SemanticIndex`] implementation.
//!
//! Uses a `HashMap` behind `std::sync::RwLock` for thread safety. Queries are
//! brute-force cosine similarity over all stored vectors, ordered by score
//! (desc) then id (asc).
//!
//! When opened with a snapshot path, the full index is loaded from that JSON
//! file and rewritten after every upsert, so separate CLI runs share what
//! earlier runs discovered. An upsert whose snapshot write fails is rolled
//! back, so memory never holds entries the file lacks and a failed store is
//! retried by the next discoverer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::embedding::cosine_similarity;
use crate::error::{ResolveError, ResolveResult};
use crate::models::IndexMetadata;

use super::{IndexMatch, SemanticIndex};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVector {
    id: String,
    vector: Vec<f32>,
    metadata: IndexMetadata,
}

/// In-memory index for tests, local runs and the CLI.
pub struct InMemoryIndex {
    entries: RwLock<HashMap<String, StoredVector>>,
    snapshot: Option<PathBuf>,
    // serializes snapshot writes so the newest state always lands last
    persist_lock: Mutex<()>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            snapshot: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Open an index backed by a JSON snapshot file.
    ///
    /// A missing file yields an empty index; the file is created on the first
    /// upsert.
    pub async fn open(path: &Path) -> ResolveResult<Self> {
        let entries = match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let stored: Vec<StoredVector> = serde_json::from_str(&content).map_err(|e| {
                    ResolveError::validation(format!(
                        "index snapshot {} is corrupt: {}",
                        path.display(),
                        e
                    ))
                })?;
                stored.into_iter().map(|sv| (sv.id.clone(), sv)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(ResolveError::transport(format!(
                    "cannot read index snapshot {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            entries: RwLock::new(entries),
            snapshot: Some(path.to_path_buf()),
            persist_lock: Mutex::new(()),
        })
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn persist(&self) -> ResolveResult<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let content = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let mut stored: Vec<&StoredVector> = entries.values().collect();
            stored.sort_by(|a, b| a.id.cmp(&b.id));
            serde_json::to_string_pretty(&stored)
                .map_err(|e| ResolveError::validation(format!("cannot encode snapshot: {}", e)))?
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ResolveError::transport(format!("cannot create {}: {}", parent.display(), e)))?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| ResolveError::transport(format!("cannot write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| ResolveError::transport(format!("cannot replace {}: {}", path.display(), e)))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SemanticIndex for InMemoryIndex {
    async fn exists(&self, id: &str) -> ResolveResult<bool> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.contains_key(id))
    }

    async fn upsert(&self, id: &str, vector: &[f32], metadata: &IndexMetadata) -> ResolveResult<()> {
        let previous = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.insert(
                id.to_string(),
                StoredVector {
                    id: id.to_string(),
                    vector: vector.to_vec(),
                    metadata: metadata.clone(),
                },
            )
        };

        let persisted = self.persist().await;
        if persisted.is_err() {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            match previous {
                Some(old) => entries.insert(id.to_string(), old),
                None => entries.remove(id),
            };
        }
        persisted
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> ResolveResult<Vec<IndexMatch>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut matches: Vec<IndexMatch> = entries
            .values()
            .map(|sv| IndexMatch {
                id: sv.id.clone(),
                score: cosine_similarity(vector, &sv.vector),
                metadata: sv.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(top_k);
        Ok(matches)
    }
}
