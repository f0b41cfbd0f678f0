//! Corpus file loading for bulk index builds.
//!
//! A corpus is a JSON array of documents exported from the content source.
//! Embeddings are computed from `content`; `excerpt` is what query results
//! surface.

use crate::index::{EntryMetadata, IndexEntry};
use crate::{RagError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub url: String,
    pub post_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub published_at: DateTime<Utc>,
    pub excerpt: String,
    pub content: String,
}

impl Document {
    /// Pair this document with its embedding to form an index entry.
    #[inline]
    pub fn into_entry(self, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            document_id: self.id,
            vector,
            excerpt: self.excerpt,
            metadata: EntryMetadata {
                title: self.title,
                slug: self.slug,
                url: self.url,
                post_type: self.post_type,
                series: self.series,
                tags: self.tags,
                published_at: self.published_at,
            },
        }
    }
}

/// Load and validate a corpus file. Duplicate document ids are rejected so a
/// bad export cannot silently drop entries during the build.
#[inline]
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<Document>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let documents: Vec<Document> = serde_json::from_str(&content).map_err(|e| {
        RagError::Config(format!("Failed to parse corpus file {}: {e}", path.display()))
    })?;

    let mut seen = std::collections::BTreeSet::new();
    for document in &documents {
        if document.id.is_empty() {
            return Err(RagError::Config(format!(
                "Corpus document '{}' has an empty id",
                document.slug
            )));
        }
        if !seen.insert(document.id.as_str()) {
            return Err(RagError::Config(format!(
                "Corpus contains duplicate document id '{}'",
                document.id
            )));
        }
    }

    info!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}
