//! Persistent vector index with flat cosine-similarity scan.
//!
//! The active snapshot is immutable and shared behind an `Arc`; every search
//! runs against exactly one snapshot. Mutations (`build`, `upsert`, `delete`)
//! serialize through a writer lock, construct the replacement snapshot off to
//! the side, persist it, and swap the active reference atomically, so readers
//! never observe a partially built index.


use crate::{RagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const SNAPSHOT_VERSION: u32 = 1;

/// Per-document metadata carried through to query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub title: String,
    pub slug: String,
    pub url: String,
    pub post_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub published_at: DateTime<Utc>,
}

/// One indexed document: its embedding plus the excerpt surfaced in results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub document_id: String,
    pub vector: Vec<f32>,
    pub excerpt: String,
    pub metadata: EntryMetadata,
}

/// A single match from a similarity search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry: IndexEntry,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexSnapshot {
    version: u32,
    provider: String,
    dimension: usize,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    entries: BTreeMap<String, IndexEntry>,
}

/// Summary of the persisted index, for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub entries: usize,
    pub dimension: usize,
    pub provider: String,
    pub updated_at: DateTime<Utc>,
}

pub struct VectorIndex {
    active: RwLock<Option<Arc<IndexSnapshot>>>,
    writer: Mutex<()>,
    path: PathBuf,
}

impl VectorIndex {
    /// Open the index stored in `data_dir`, loading an existing snapshot if
    /// one is present. A snapshot that fails to deserialize is fatal; a
    /// partially loaded index is never served.
    #[inline]
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let path = data_dir.as_ref().join("index.json");

        let snapshot = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let snapshot: IndexSnapshot = serde_json::from_str(&content).map_err(|e| {
                RagError::IndexCorrupt(format!(
                    "Failed to deserialize {}: {e}; rebuild the index",
                    path.display()
                ))
            })?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(RagError::IndexCorrupt(format!(
                    "Unsupported snapshot version {}; rebuild the index",
                    snapshot.version
                )));
            }
            info!(
                "Loaded vector index: {} entries, {} dimensions, provider {}",
                snapshot.entries.len(),
                snapshot.dimension,
                snapshot.provider
            );
            Some(Arc::new(snapshot))
        } else {
            debug!("No vector index at {}, starting empty", path.display());
            None
        };

        Ok(Self {
            active: RwLock::new(snapshot),
            writer: Mutex::new(()),
            path,
        })
    }

    fn current(&self) -> Option<Arc<IndexSnapshot>> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap(&self, snapshot: Arc<IndexSnapshot>) {
        let mut guard = self
            .active
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(snapshot);
    }

    fn persist(&self, snapshot: &IndexSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string(snapshot)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to serialize index: {e}")))?;

        // Write-then-rename keeps the on-disk snapshot whole even if the
        // process dies mid-write.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Replace the entire index atomically. Searches already running against
    /// the previous snapshot complete normally against it.
    #[inline]
    pub async fn build(
        &self,
        entries: Vec<IndexEntry>,
        dimension: usize,
        provider: &str,
    ) -> Result<()> {
        let _writer = self.writer.lock().await;

        for entry in &entries {
            if entry.vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
        }

        let now = Utc::now();
        let created_at = self.current().map_or(now, |s| s.created_at);
        let count = entries.len();
        let snapshot = Arc::new(IndexSnapshot {
            version: SNAPSHOT_VERSION,
            provider: provider.to_string(),
            dimension,
            created_at,
            updated_at: now,
            entries: entries
                .into_iter()
                .map(|e| (e.document_id.clone(), e))
                .collect(),
        });

        self.persist(&snapshot)?;
        self.swap(snapshot);

        info!(
            "Rebuilt vector index: {} entries, {} dimensions, provider {}",
            count, dimension, provider
        );
        Ok(())
    }

    /// Insert or replace one entry by `document_id`.
    #[inline]
    pub async fn upsert(&self, entry: IndexEntry) -> Result<()> {
        let _writer = self.writer.lock().await;

        let current = self.current().ok_or(RagError::IndexNotBuilt)?;
        if entry.vector.len() != current.dimension {
            return Err(RagError::DimensionMismatch {
                expected: current.dimension,
                actual: entry.vector.len(),
            });
        }

        let mut entries = current.entries.clone();
        debug!("Upserting index entry: {}", entry.document_id);
        entries.insert(entry.document_id.clone(), entry);

        let snapshot = Arc::new(IndexSnapshot {
            entries,
            updated_at: Utc::now(),
            ..(*current).clone()
        });
        self.persist(&snapshot)?;
        self.swap(snapshot);
        Ok(())
    }

    /// Remove one entry; a no-op when the id is absent.
    #[inline]
    pub async fn delete(&self, document_id: &str) -> Result<()> {
        let _writer = self.writer.lock().await;

        let Some(current) = self.current() else {
            return Ok(());
        };
        if !current.entries.contains_key(document_id) {
            return Ok(());
        }

        let mut entries = current.entries.clone();
        entries.remove(document_id);
        debug!("Deleted index entry: {}", document_id);

        let snapshot = Arc::new(IndexSnapshot {
            entries,
            updated_at: Utc::now(),
            ..(*current).clone()
        });
        self.persist(&snapshot)?;
        self.swap(snapshot);
        Ok(())
    }

    /// Top-k cosine-similarity search against one atomic snapshot.
    ///
    /// Results are ordered by similarity descending, ties broken by
    /// `published_at` descending and then `document_id` ascending so repeated
    /// queries are deterministic.
    #[inline]
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let snapshot = self.current().ok_or(RagError::IndexNotBuilt)?;

        if query_vector.len() != snapshot.dimension {
            return Err(RagError::DimensionMismatch {
                expected: snapshot.dimension,
                actual: query_vector.len(),
            });
        }

        let mut hits: Vec<SearchHit> = snapshot
            .entries
            .values()
            .map(|entry| SearchHit {
                similarity: cosine_similarity(query_vector, &entry.vector),
                entry: entry.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| {
                    b.entry
                        .metadata
                        .published_at
                        .cmp(&a.entry.metadata.published_at)
                })
                .then_with(|| a.entry.document_id.cmp(&b.entry.document_id))
        });
        hits.truncate(k);

        debug!(
            "Search returned {} of {} entries (k={})",
            hits.len(),
            snapshot.entries.len(),
            k
        );
        Ok(hits)
    }

    /// Refuse to serve a query-time provider whose dimension disagrees with
    /// the one the index was built with. A changed model name with a matching
    /// dimension is tolerated with a warning; the stored identifier only
    /// changes on rebuild.
    #[inline]
    pub fn verify_provider(&self, provider: &str, dimension: Option<usize>) -> Result<()> {
        let Some(snapshot) = self.current() else {
            return Ok(());
        };

        if let Some(dim) = dimension {
            if dim != snapshot.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: snapshot.dimension,
                    actual: dim,
                });
            }
        }

        if provider != snapshot.provider {
            warn!(
                "Embedding provider changed since the index was built ({} -> {}); \
                 results may degrade until the next rebuild",
                snapshot.provider, provider
            );
        }

        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.current().map_or(0, |s| s.entries.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn stats(&self) -> Option<IndexStats> {
        self.current().map(|s| IndexStats {
            entries: s.entries.len(),
            dimension: s.dimension,
            provider: s.provider.clone(),
            updated_at: s.updated_at,
        })
    }
}

/// Cosine similarity in [-1, 1]; zero-magnitude vectors compare as 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    dot / denominator
}

/// Map cosine similarity [-1, 1] to the 0-100 percentage surfaced to callers.
#[inline]
pub fn similarity_score(similarity: f32) -> u8 {
    (((similarity + 1.0) / 2.0 * 100.0).round().clamp(0.0, 100.0)) as u8
}
