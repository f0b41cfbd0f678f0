//! Embedding provider abstraction.
//!
//! A single capability set (`embed`, `dimension`, `health_check`) with two
//! named backends: a remote network service and a local in-process model,
//! composed by an auto-selecting wrapper that caches its choice.

#[cfg(test)]
mod tests;

pub mod local;
pub mod remote;

pub use local::LocalProvider;
pub use remote::RemoteProvider;

use crate::config::{Config, ProviderMode};
use crate::{RagError, Result};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier of the backend currently producing vectors.
    fn name(&self) -> &str;

    /// Vector length, when known. Remote backends report `None` until their
    /// first successful embedding fixes the dimension.
    fn dimension(&self) -> Option<usize>;

    /// Turn text into a fixed-length vector. Cancellation before completion
    /// commits nothing.
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>>;

    /// Short-timeout liveness probe, distinct from (and faster than) a real
    /// embedding call.
    async fn health_check(&self) -> bool;
}

/// Which backend the auto-selector settled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Remote,
    Local,
}

/// Wrapper that probes the remote backend once, caches the selection for the
/// process lifetime, and falls back to the local backend when the remote one
/// fails mid-call.
pub struct AutoProvider {
    remote: RemoteProvider,
    local: LocalProvider,
    selection: Mutex<Option<Backend>>,
}

impl AutoProvider {
    #[inline]
    pub fn new(remote: RemoteProvider, local: LocalProvider) -> Self {
        Self {
            remote,
            local,
            selection: Mutex::new(None),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            RemoteProvider::from_config(config)?,
            LocalProvider::from_config(config),
        ))
    }

    /// The cached backend choice, if a probe has happened yet.
    #[inline]
    pub fn selected(&self) -> Option<Backend> {
        *self
            .selection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop the cached selection so the next call re-probes the remote
    /// backend.
    #[inline]
    pub fn reset_selection(&self) {
        let mut guard = self
            .selection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }

    async fn select(&self) -> Backend {
        if let Some(backend) = self.selected() {
            return backend;
        }

        // Concurrent first calls may both probe; the result is identical and
        // the cache is written once either way.
        let backend = if self.remote.health_check().await {
            Backend::Remote
        } else {
            Backend::Local
        };

        match backend {
            Backend::Remote => info!(
                "Embedding backend selected: remote ({})",
                self.remote.name()
            ),
            Backend::Local => info!(
                "Embedding backend selected: local ({}), remote probe failed",
                self.local.name()
            ),
        }

        let mut guard = self
            .selection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard.get_or_insert(backend)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for AutoProvider {
    #[inline]
    fn name(&self) -> &str {
        match self.selected() {
            Some(Backend::Local) => self.local.name(),
            _ => self.remote.name(),
        }
    }

    #[inline]
    fn dimension(&self) -> Option<usize> {
        match self.selected() {
            Some(Backend::Remote) => self.remote.dimension(),
            Some(Backend::Local) => self.local.dimension(),
            None => None,
        }
    }

    #[inline]
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        match self.select().await {
            Backend::Local => self.local.embed(text, cancel).await,
            Backend::Remote => match self.remote.embed(text, cancel).await {
                Ok(vector) => Ok(vector),
                Err(RagError::Cancelled) => Err(RagError::Cancelled),
                Err(remote_err) => {
                    // One fallback attempt per call; the cached selection is
                    // left alone so a transient blip does not demote the
                    // remote backend permanently.
                    warn!(
                        "Remote embedding failed ({}), falling back to local backend",
                        remote_err
                    );
                    self.local.embed(text, cancel).await.map_err(|local_err| {
                        RagError::ProviderUnavailable(format!(
                            "Remote backend failed ({remote_err}); local fallback failed ({local_err})"
                        ))
                    })
                }
            },
        }
    }

    #[inline]
    async fn health_check(&self) -> bool {
        self.remote.health_check().await || self.local.health_check().await
    }
}

/// Construct the provider named by the configured selection policy.
#[inline]
pub fn provider_for(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        ProviderMode::Auto => Ok(Arc::new(AutoProvider::from_config(config)?)),
        ProviderMode::Remote => Ok(Arc::new(RemoteProvider::from_config(config)?)),
        ProviderMode::Local => Ok(Arc::new(LocalProvider::from_config(config))),
    }
}
