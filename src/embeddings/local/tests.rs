use super::*;
use crate::index::cosine_similarity;

fn provider() -> LocalProvider {
    LocalProvider::new("hash-embed-v1".to_string(), 384)
}

#[tokio::test]
async fn embedding_has_configured_dimension() {
    let provider = provider();
    let cancel = CancellationToken::new();

    let vector = provider
        .embed("The quick brown fox", &cancel)
        .await
        .expect("Failed to embed");

    assert_eq!(vector.len(), 384);
    assert_eq!(provider.dimension(), Some(384));
}

#[tokio::test]
async fn embedding_is_deterministic() {
    let provider = provider();
    let cancel = CancellationToken::new();

    let a = provider
        .embed("Reading notes on attention", &cancel)
        .await
        .expect("Failed to embed");
    let b = provider
        .embed("Reading notes on attention", &cancel)
        .await
        .expect("Failed to embed");

    assert_eq!(a, b);
}

#[tokio::test]
async fn embedding_is_normalized() {
    let provider = provider();
    let cancel = CancellationToken::new();

    let vector = provider
        .embed("normalization check", &cancel)
        .await
        .expect("Failed to embed");

    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
}

#[tokio::test]
async fn overlapping_texts_are_closer_than_disjoint_ones() {
    let provider = provider();
    let cancel = CancellationToken::new();

    let base = provider
        .embed("drafting a blog post about gardening", &cancel)
        .await
        .expect("Failed to embed");
    let related = provider
        .embed("a blog post about gardening tools", &cancel)
        .await
        .expect("Failed to embed");
    let unrelated = provider
        .embed("quarterly financial projections spreadsheet", &cancel)
        .await
        .expect("Failed to embed");

    let related_sim = cosine_similarity(&base, &related);
    let unrelated_sim = cosine_similarity(&base, &unrelated);
    assert!(
        related_sim > unrelated_sim,
        "expected {related_sim} > {unrelated_sim}"
    );
}

#[tokio::test]
async fn empty_text_yields_zero_vector() {
    let provider = provider();
    let cancel = CancellationToken::new();

    let vector = provider.embed("", &cancel).await.expect("Failed to embed");
    assert!(vector.iter().all(|v| *v == 0.0));
}

#[tokio::test]
async fn cancelled_embed_commits_nothing() {
    let provider = provider();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = provider.embed("anything", &cancel).await;
    assert!(matches!(result, Err(RagError::Cancelled)));
}

#[tokio::test]
async fn local_backend_is_always_healthy() {
    assert!(provider().health_check().await);
}
