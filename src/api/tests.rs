use super::*;
use crate::embeddings::{EmbeddingProvider, LocalProvider};
use crate::index::{EntryMetadata, IndexEntry, VectorIndex};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

async fn service_with_corpus() -> (TempDir, Arc<RagQueryService>) {
    let provider = Arc::new(LocalProvider::new("hash-embed-v1".to_string(), 128));
    let cancel = CancellationToken::new();

    let mut entries = Vec::new();
    for (id, text, post_type) in [
        ("ownership", "ownership and borrowing rules in rust", "standard"),
        ("gardens", "watering schedules for summer gardens", "fleeting"),
    ] {
        let vector = provider
            .embed(text, &cancel)
            .await
            .expect("Failed to embed");
        entries.push(IndexEntry {
            document_id: id.to_string(),
            vector,
            excerpt: text.to_string(),
            metadata: EntryMetadata {
                title: format!("Post {id}"),
                slug: id.to_string(),
                url: format!("/blog/{id}"),
                post_type: post_type.to_string(),
                series: None,
                tags: None,
                published_at: Utc
                    .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                    .single()
                    .expect("valid date"),
            },
        });
    }

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let index = VectorIndex::open(temp_dir.path()).expect("Failed to open index");
    index
        .build(entries, 128, "hash-embed-v1")
        .await
        .expect("Failed to build index");

    (
        temp_dir,
        Arc::new(RagQueryService::new(provider, Arc::new(index))),
    )
}

#[tokio::test]
async fn disabled_api_rejects_every_request() {
    let (_dir, service) = service_with_corpus().await;
    let api = AdminApi::new(service, false);

    let request = QueryRequest {
        query: "anything".to_string(),
        top_k: 5,
        filter: None,
    };
    let error = api
        .query(request, &CancellationToken::new())
        .await
        .expect_err("Disabled API should reject");
    assert_eq!(error.error, ErrorKind::Disabled);
}

#[tokio::test]
async fn blank_query_is_a_bad_request() {
    let (_dir, service) = service_with_corpus().await;
    let api = AdminApi::new(service, true);

    let request = QueryRequest {
        query: "   ".to_string(),
        top_k: 5,
        filter: None,
    };
    let error = api
        .query(request, &CancellationToken::new())
        .await
        .expect_err("Blank query should reject");
    assert_eq!(error.error, ErrorKind::BadRequest);
}

#[tokio::test]
async fn zero_top_k_is_a_bad_request() {
    let (_dir, service) = service_with_corpus().await;
    let api = AdminApi::new(service, true);

    let request = QueryRequest {
        query: "rust".to_string(),
        top_k: 0,
        filter: None,
    };
    let error = api
        .query(request, &CancellationToken::new())
        .await
        .expect_err("Zero topK should reject");
    assert_eq!(error.error, ErrorKind::BadRequest);
}

#[tokio::test]
async fn successful_query_reports_count_and_timing() {
    let (_dir, service) = service_with_corpus().await;
    let api = AdminApi::new(service, true);

    let request = QueryRequest {
        query: "borrowing rules".to_string(),
        top_k: 2,
        filter: None,
    };
    let response = api
        .query(request, &CancellationToken::new())
        .await
        .expect("Query failed");

    assert_eq!(response.count, 2);
    assert_eq!(response.results.len(), 2);
    assert_eq!(response.results[0].metadata.slug, "ownership");
}

#[tokio::test]
async fn filter_flows_through_the_request() {
    let (_dir, service) = service_with_corpus().await;
    let api = AdminApi::new(service, true);

    let request: QueryRequest = serde_json::from_str(
        r#"{ "query": "summer", "filter": { "postTypes": ["fleeting"] } }"#,
    )
    .expect("Failed to deserialize request");
    assert_eq!(request.top_k, 10);

    let response = api
        .query(request, &CancellationToken::new())
        .await
        .expect("Query failed");
    assert_eq!(response.count, 1);
    assert_eq!(response.results[0].metadata.post_type, "fleeting");
}

#[tokio::test]
async fn unbuilt_index_maps_to_rebuild_required() {
    let provider = Arc::new(LocalProvider::new("hash-embed-v1".to_string(), 128));
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let index = VectorIndex::open(temp_dir.path()).expect("Failed to open index");
    let service = Arc::new(RagQueryService::new(provider, Arc::new(index)));
    let api = AdminApi::new(service, true);

    let request = QueryRequest {
        query: "rust".to_string(),
        top_k: 5,
        filter: None,
    };
    let error = api
        .query(request, &CancellationToken::new())
        .await
        .expect_err("Unbuilt index should reject");
    assert_eq!(error.error, ErrorKind::RebuildRequired);
}

#[test]
fn error_envelope_distinguishes_retry_from_rebuild() {
    let outage: ErrorResponse = RagError::ProviderUnavailable("down".to_string()).into();
    assert_eq!(outage.error, ErrorKind::Unavailable);

    let mismatch: ErrorResponse = RagError::DimensionMismatch {
        expected: 384,
        actual: 768,
    }
    .into();
    assert_eq!(mismatch.error, ErrorKind::RebuildRequired);

    let corrupt: ErrorResponse = RagError::IndexCorrupt("bad json".to_string()).into();
    assert_eq!(corrupt.error, ErrorKind::RebuildRequired);

    let other: ErrorResponse = RagError::Storage("locked".to_string()).into();
    assert_eq!(other.error, ErrorKind::Internal);
}

#[test]
fn response_serializes_with_camel_case_keys() {
    let response = QueryResponse {
        results: Vec::new(),
        count: 0,
        query_time_ms: 12,
    };
    let json = serde_json::to_value(&response).expect("Failed to serialize");
    assert_eq!(json["count"], 0);
    assert_eq!(json["queryTimeMs"], 12);
    assert!(json["results"].as_array().expect("results array").is_empty());
}
