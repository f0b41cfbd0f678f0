#[cfg(test)]
mod tests;

use crate::{RagError, Result};
use std::hash::{DefaultHasher, Hash, Hasher};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;

const BIGRAM_WEIGHT: f32 = 0.5;

/// In-process embedding backend with zero network dependency.
///
/// Texts are embedded by hashing lowercased word unigrams and bigrams into a
/// fixed number of signed buckets and L2-normalizing the result. This is far
/// weaker than a trained model but fully deterministic, so overlapping texts
/// still land close together in cosine space, which is what the fallback path
/// needs when no embedding server is reachable.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    model: String,
    dimensions: usize,
}

impl LocalProvider {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.local.model.clone(), config.local.dimensions)
    }

    #[inline]
    pub fn new(model: String, dimensions: usize) -> Self {
        Self { model, dimensions }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for word in &words {
            accumulate(&mut vector, word, 1.0);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            accumulate(&mut vector, &bigram, BIGRAM_WEIGHT);
        }

        l2_normalize(&mut vector);
        vector
    }
}

fn accumulate(vector: &mut [f32], feature: &str, weight: f32) {
    let mut hasher = DefaultHasher::new();
    feature.hash(&mut hasher);
    let hash = hasher.finish();

    let bucket = (hash % vector.len() as u64) as usize;
    // Top bit decides the sign so collisions partially cancel instead of
    // always inflating the same bucket.
    let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign * weight;
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for LocalProvider {
    #[inline]
    fn name(&self) -> &str {
        &self.model
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    #[inline]
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        if cancel.is_cancelled() {
            return Err(RagError::Cancelled);
        }

        debug!(
            "Embedding text locally with {} ({} dimensions)",
            self.model, self.dimensions
        );

        let provider = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || provider.embed_text(&text))
            .await
            .map_err(|e| RagError::ProviderUnavailable(format!("Local embedding failed: {e}")))
    }

    #[inline]
    async fn health_check(&self) -> bool {
        true
    }
}
