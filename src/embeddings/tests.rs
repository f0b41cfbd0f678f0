use super::*;
use serde_json::json;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn unreachable_remote() -> RemoteProvider {
    let base_url = Url::parse("http://127.0.0.1:1").expect("URL should parse");
    RemoteProvider::with_timeouts(
        base_url,
        "nomic-embed-text".to_string(),
        Duration::from_secs(1),
        Duration::from_millis(200),
    )
}

fn remote_for(server: &MockServer) -> RemoteProvider {
    let base_url = Url::parse(&server.uri()).expect("Mock server URI should parse");
    RemoteProvider::with_timeouts(
        base_url,
        "nomic-embed-text".to_string(),
        Duration::from_secs(5),
        Duration::from_millis(500),
    )
}

fn local() -> LocalProvider {
    LocalProvider::new("hash-embed-v1".to_string(), 64)
}

#[tokio::test]
async fn unreachable_remote_selects_local() {
    let provider = AutoProvider::new(unreachable_remote(), local());
    let cancel = CancellationToken::new();

    assert_eq!(provider.selected(), None);

    let vector = provider
        .embed("hello", &cancel)
        .await
        .expect("Embed should fall through to the local backend");

    assert_eq!(vector.len(), 64);
    assert_eq!(provider.selected(), Some(Backend::Local));
    assert_eq!(provider.dimension(), Some(64));
    assert_eq!(provider.name(), "hash-embed-v1");
}

#[tokio::test]
async fn healthy_remote_is_selected_and_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [0.1, 0.2, 0.3]
        })))
        .mount(&server)
        .await;

    let provider = AutoProvider::new(remote_for(&server), local());
    let cancel = CancellationToken::new();

    // Two embeds, but the mock expects exactly one probe: the selection is
    // cached after the first call.
    let first = provider
        .embed("one", &cancel)
        .await
        .expect("Failed to embed");
    let second = provider
        .embed("two", &cancel)
        .await
        .expect("Failed to embed");

    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    assert_eq!(provider.selected(), Some(Backend::Remote));
}

#[tokio::test]
async fn transient_remote_failure_falls_back_for_that_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": [] })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = AutoProvider::new(remote_for(&server), local());
    let cancel = CancellationToken::new();

    let vector = provider
        .embed("hello", &cancel)
        .await
        .expect("Local fallback should cover the remote failure");

    assert_eq!(vector.len(), 64);
    // The selection stays remote; only this call fell back.
    assert_eq!(provider.selected(), Some(Backend::Remote));
}

#[tokio::test]
async fn reset_selection_forces_a_new_probe() {
    let provider = AutoProvider::new(unreachable_remote(), local());
    let cancel = CancellationToken::new();

    provider
        .embed("hello", &cancel)
        .await
        .expect("Failed to embed");
    assert_eq!(provider.selected(), Some(Backend::Local));

    provider.reset_selection();
    assert_eq!(provider.selected(), None);
}

#[tokio::test]
async fn provider_for_honors_the_configured_mode() {
    use crate::config::{Config, ProviderMode};

    let mut config = Config::default();
    config.provider = ProviderMode::Local;
    config.local.dimensions = 128;

    let provider = provider_for(&config).expect("Failed to build provider");
    assert_eq!(provider.dimension(), Some(128));

    config.provider = ProviderMode::Remote;
    let provider = provider_for(&config).expect("Failed to build provider");
    assert_eq!(provider.dimension(), None);
    assert_eq!(provider.name(), "nomic-embed-text");
}
