//! Transport-agnostic admin query surface.
//!
//! Mirrors the JSON contract of the admin query endpoint: a request with a
//! query string, an optional result count, and an optional metadata filter;
//! a response carrying ranked results and timing. Callers embed this behind
//! whatever transport they run; the handler itself only shapes requests,
//! responses, and the error envelope.

#[cfg(test)]
mod tests;

use crate::RagError;
use crate::query::{MetadataFilter, RagQueryResult, RagQueryService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const DEFAULT_TOP_K: usize = 10;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filter: Option<MetadataFilter>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub results: Vec<RagQueryResult>,
    pub count: usize,
    pub query_time_ms: u64,
}

/// Error envelope. `error` is a stable machine-readable kind; `detail` is
/// free text for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: ErrorKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The admin surface is switched off in this environment.
    Disabled,
    /// The request itself is malformed.
    BadRequest,
    /// Transient backend outage; the caller may retry.
    Unavailable,
    /// The index must be rebuilt before queries can succeed.
    RebuildRequired,
    Internal,
}

impl From<RagError> for ErrorResponse {
    #[inline]
    fn from(error: RagError) -> Self {
        let kind = if error.is_retriable() {
            ErrorKind::Unavailable
        } else if error.requires_rebuild() {
            ErrorKind::RebuildRequired
        } else {
            ErrorKind::Internal
        };
        Self {
            error: kind,
            detail: error.to_string(),
        }
    }
}

pub struct AdminApi {
    service: Arc<RagQueryService>,
    enabled: bool,
}

impl AdminApi {
    #[inline]
    pub fn new(service: Arc<RagQueryService>, enabled: bool) -> Self {
        Self { service, enabled }
    }

    /// Handle one query request end to end.
    #[inline]
    pub async fn query(
        &self,
        request: QueryRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<QueryResponse, ErrorResponse> {
        if !self.enabled {
            return Err(ErrorResponse {
                error: ErrorKind::Disabled,
                detail: "Admin query API is disabled in this environment".to_string(),
            });
        }

        if request.query.trim().is_empty() {
            return Err(ErrorResponse {
                error: ErrorKind::BadRequest,
                detail: "Query must not be empty".to_string(),
            });
        }
        if request.top_k == 0 {
            return Err(ErrorResponse {
                error: ErrorKind::BadRequest,
                detail: "topK must be at least 1".to_string(),
            });
        }

        let started = Instant::now();
        let results = self
            .service
            .query(
                &request.query,
                request.top_k,
                request.filter.as_ref(),
                cancel,
            )
            .await
            .map_err(|e| {
                warn!("Admin query failed: {e}");
                ErrorResponse::from(e)
            })?;

        let query_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            "Admin query returned {} results in {}ms",
            results.len(),
            query_time_ms
        );
        Ok(QueryResponse {
            count: results.len(),
            results,
            query_time_ms,
        })
    }
}
