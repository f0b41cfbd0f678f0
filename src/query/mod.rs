//! Query orchestration: embed the incoming text, search the index, shape
//! results for presentation.


use crate::Result;
use crate::embeddings::EmbeddingProvider;
use crate::index::{EntryMetadata, SearchHit, VectorIndex, similarity_score};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How many times a filtered query widens its fetch before giving up on
/// reaching the requested result count.
const MAX_FILTER_RETRIES: u32 = 2;

/// Post-filter over entry metadata. Filters are applied after the similarity
/// search, so a starved result set triggers a wider re-fetch rather than a
/// narrower search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataFilter {
    pub post_types: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

impl MetadataFilter {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.post_types.is_none() && self.tags.is_none()
    }

    #[inline]
    pub fn matches(&self, metadata: &EntryMetadata) -> bool {
        if let Some(post_types) = &self.post_types {
            if !post_types.iter().any(|t| *t == metadata.post_type) {
                return false;
            }
        }

        if let Some(wanted) = &self.tags {
            let Some(tags) = &metadata.tags else {
                return false;
            };
            if !wanted.iter().any(|w| tags.contains(w)) {
                return false;
            }
        }

        true
    }
}

/// Read-only projection produced per query; never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagQueryResult {
    pub content: String,
    pub score: u8,
    pub metadata: EntryMetadata,
    pub url: String,
}

impl From<SearchHit> for RagQueryResult {
    #[inline]
    fn from(hit: SearchHit) -> Self {
        Self {
            content: hit.entry.excerpt,
            score: similarity_score(hit.similarity),
            url: hit.entry.metadata.url.clone(),
            metadata: hit.entry.metadata,
        }
    }
}

pub struct RagQueryService {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
}

impl RagQueryService {
    #[inline]
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: Arc<VectorIndex>) -> Self {
        Self { provider, index }
    }

    /// Embed `text` and return up to `k` ranked results.
    ///
    /// Embedding failure surfaces as `ProviderUnavailable`; a dimension
    /// disagreement between the provider and the index surfaces as
    /// `DimensionMismatch`, which tells the caller a rebuild is required.
    #[inline]
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
        cancel: &CancellationToken,
    ) -> Result<Vec<RagQueryResult>> {
        let query_vector = self.provider.embed(text, cancel).await?;
        self.index
            .verify_provider(self.provider.name(), self.provider.dimension())?;

        let effective_filter = filter.filter(|f| !f.is_empty());
        let index_size = self.index.len();

        let mut fetch_k = k;
        let mut retries = 0;
        loop {
            let hits = self.index.search(&query_vector, fetch_k)?;
            let fetched = hits.len();

            let mut kept: Vec<RagQueryResult> = hits
                .into_iter()
                .filter(|hit| {
                    effective_filter.is_none_or(|f| f.matches(&hit.entry.metadata))
                })
                .map(RagQueryResult::from)
                .collect();

            let exhausted = fetched >= index_size;
            if kept.len() >= k || exhausted || retries >= MAX_FILTER_RETRIES {
                kept.truncate(k);
                debug!(
                    "Query produced {} results (k={}, fetched={}, retries={})",
                    kept.len(),
                    k,
                    fetched,
                    retries
                );
                return Ok(kept);
            }

            // The filter starved the result set; fetch wider and try again.
            fetch_k = fetch_k.saturating_mul(2);
            retries += 1;
            debug!(
                "Filter left {} of {} requested results, widening fetch to {}",
                kept.len(),
                k,
                fetch_k
            );
        }
    }
}
