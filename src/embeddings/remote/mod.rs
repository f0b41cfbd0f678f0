
use crate::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::embeddings::EmbeddingProvider;

pub const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const EMBED_ENDPOINT: &str = "/api/embeddings";
const PROBE_ENDPOINT: &str = "/api/tags";

/// Embedding backend that calls a network embedding service speaking the
/// Ollama wire protocol. The vector dimension is not known up front; it is
/// detected from the first successful response and cached for the lifetime
/// of the provider.
#[derive(Debug)]
pub struct RemoteProvider {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
    probe_agent: ureq::Agent,
    dimension: OnceLock<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl RemoteProvider {
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = config
            .remote_base_url()
            .map_err(|e| RagError::Config(e.to_string()))?;
        Ok(Self::new(base_url, config.remote.model.clone()))
    }

    #[inline]
    pub fn new(base_url: Url, model: String) -> Self {
        Self::with_timeouts(base_url, model, DEFAULT_EMBED_TIMEOUT, DEFAULT_PROBE_TIMEOUT)
    }

    /// The probe timeout must stay well below the embed timeout so a dead
    /// server is detected quickly at selection time.
    #[inline]
    pub fn with_timeouts(
        base_url: Url,
        model: String,
        embed_timeout: Duration,
        probe_timeout: Duration,
    ) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(embed_timeout))
            .build()
            .into();
        let probe_agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(probe_timeout))
            .build()
            .into();

        Self {
            base_url,
            model,
            agent,
            probe_agent,
            dimension: OnceLock::new(),
        }
    }

    fn embed_url(&self) -> Result<Url> {
        self.base_url
            .join(EMBED_ENDPOINT)
            .map_err(|e| RagError::Config(format!("Failed to build embedding URL: {e}")))
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for RemoteProvider {
    #[inline]
    fn name(&self) -> &str {
        &self.model
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    #[inline]
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        let url = self.embed_url()?;
        let request = EmbedRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| RagError::ProviderUnavailable(format!("Request serialization: {e}")))?;

        debug!(
            "Requesting embedding from {} (text length: {})",
            url,
            text.len()
        );

        let agent = self.agent.clone();
        let task = tokio::task::spawn_blocking(move || {
            agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        });

        let response_text = tokio::select! {
            _ = cancel.cancelled() => return Err(RagError::Cancelled),
            joined = task => joined
                .map_err(|e| RagError::ProviderUnavailable(format!("Embedding task failed: {e}")))?
                .map_err(|e| RagError::ProviderUnavailable(format!("Embedding request failed: {e}")))?,
        };

        let response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            RagError::ProviderUnavailable(format!("Malformed embedding response: {e}"))
        })?;

        if response.embedding.is_empty() {
            return Err(RagError::ProviderUnavailable(
                "Embedding response contained an empty vector".to_string(),
            ));
        }

        // First successful response fixes the dimension for this provider.
        let dimension = *self.dimension.get_or_init(|| response.embedding.len());
        if response.embedding.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: response.embedding.len(),
            });
        }

        debug!("Received embedding with {} dimensions", dimension);
        Ok(response.embedding)
    }

    #[inline]
    async fn health_check(&self) -> bool {
        let Ok(url) = self.base_url.join(PROBE_ENDPOINT) else {
            return false;
        };

        debug!("Probing embedding server at {}", url);

        let agent = self.probe_agent.clone();
        let result =
            tokio::task::spawn_blocking(move || agent.get(url.as_str()).call().map(|_| ())).await;

        match result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Embedding server probe failed: {}", e);
                false
            }
            Err(e) => {
                warn!("Embedding server probe task failed: {}", e);
                false
            }
        }
    }
}
