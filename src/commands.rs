use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{AdminApi, QueryRequest};
use crate::config::Config;
use crate::conversations::ConversationStore;
use crate::conversations::models::{NewMessage, Role};
use crate::corpus::load_corpus;
use crate::embeddings::provider_for;
use crate::index::VectorIndex;
use crate::query::{MetadataFilter, RagQueryService};
use crate::{RagError, Result};

fn open_service(config: &Config) -> Result<Arc<RagQueryService>> {
    let provider = provider_for(config)?;
    let index = Arc::new(VectorIndex::open(&config.data_dir)?);
    Ok(Arc::new(RagQueryService::new(provider, index)))
}

/// Embed every document in the corpus file and rebuild the index from
/// scratch.
#[inline]
pub async fn build_index(
    config: &Config,
    corpus_path: &std::path::Path,
    cancel: &CancellationToken,
) -> Result<()> {
    info!("Building index from corpus: {}", corpus_path.display());
    let started = Instant::now();

    let documents = load_corpus(corpus_path)?;
    if documents.is_empty() {
        return Err(RagError::Config(format!(
            "Corpus file {} contains no documents",
            corpus_path.display()
        )));
    }

    let provider = provider_for(config)?;
    let total = documents.len();

    let mut entries = Vec::with_capacity(total);
    for (position, document) in documents.into_iter().enumerate() {
        let vector = provider.embed(&document.content, cancel).await?;
        entries.push(document.into_entry(vector));
        if (position + 1) % 25 == 0 {
            println!("Embedded {}/{} documents", position + 1, total);
        }
    }

    // All entries come from one provider; the first vector fixes the
    // dimension and build() validates the rest against it.
    let dimension = entries[0].vector.len();
    let index = VectorIndex::open(&config.data_dir)?;
    index.build(entries, dimension, provider.name()).await?;

    println!("Index built successfully!");
    println!("  Documents indexed: {total}");
    println!("  Dimensions: {dimension}");
    println!("  Provider: {}", provider.name());
    println!("  Duration: {:?}", started.elapsed());
    Ok(())
}

/// Run one query against the index and print ranked results. With `json`,
/// the request goes through the admin API surface and the raw envelope is
/// printed instead.
#[inline]
pub async fn run_query(
    config: &Config,
    text: &str,
    top_k: usize,
    post_types: Vec<String>,
    tags: Vec<String>,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let service = open_service(config)?;

    let filter = if post_types.is_empty() && tags.is_empty() {
        None
    } else {
        Some(MetadataFilter {
            post_types: (!post_types.is_empty()).then_some(post_types),
            tags: (!tags.is_empty()).then_some(tags),
        })
    };

    if json {
        let api = AdminApi::new(service, config.api.enabled);
        let request = QueryRequest {
            query: text.to_string(),
            top_k,
            filter,
        };
        match api.query(request, cancel).await {
            Ok(response) => println!(
                "{}",
                serde_json::to_string_pretty(&response)
                    .map_err(|e| RagError::Other(anyhow::anyhow!(e)))?
            ),
            Err(envelope) => println!(
                "{}",
                serde_json::to_string_pretty(&envelope)
                    .map_err(|e| RagError::Other(anyhow::anyhow!(e)))?
            ),
        }
        return Ok(());
    }

    let results = service.query(text, top_k, filter.as_ref(), cancel).await?;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!("Results ({}):", results.len());
    println!();
    for (rank, result) in results.iter().enumerate() {
        println!(
            "{}. {} (score: {})",
            rank + 1,
            result.metadata.title,
            result.score
        );
        println!("   URL: {}", result.url);
        println!("   Type: {}", result.metadata.post_type);
        if let Some(tags) = &result.metadata.tags {
            println!("   Tags: {}", tags.join(", "));
        }
        println!("   {}", result.content);
        println!();
    }
    Ok(())
}

/// Show the index snapshot stats and whether the embedding backend is
/// reachable.
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("Data directory: {}", config.data_dir.display());
    println!("Provider mode: {}", config.provider);

    let provider = provider_for(config)?;
    let healthy = provider.health_check().await;
    println!(
        "Embedding backend: {} ({})",
        provider.name(),
        if healthy { "reachable" } else { "unreachable" }
    );

    let index = VectorIndex::open(&config.data_dir)?;
    match index.stats() {
        Some(stats) => {
            println!("Index: {} entries", stats.entries);
            println!("  Dimensions: {}", stats.dimension);
            println!("  Built with: {}", stats.provider);
            println!("  Last updated: {}", stats.updated_at);
        }
        None => {
            println!("Index: not built yet");
            println!("Use 'lexi-rag build <corpus.json>' to build it.");
        }
    }
    Ok(())
}

/// List every conversation session with its summary line.
#[inline]
pub async fn list_sessions(config: &Config) -> Result<()> {
    let store = ConversationStore::new(config.conversations_db_path()).await?;
    let sessions = store.list_sessions().await?;

    if sessions.is_empty() {
        println!("No conversation sessions recorded.");
        return Ok(());
    }

    println!("Sessions ({} total):", sessions.len());
    println!();
    for session in &sessions {
        println!(
            "{} ({} messages, last active {})",
            session.session_id, session.message_count, session.last_activity
        );
        match &session.summary {
            Some(summary) => println!("   {summary}"),
            None => println!("   (no user messages)"),
        }
    }
    Ok(())
}

/// Print the full transcript of one session.
#[inline]
pub async fn show_session(config: &Config, session_id: &str) -> Result<()> {
    let store = ConversationStore::new(config.conversations_db_path()).await?;
    let transcript = store.transcript(session_id).await?;

    if transcript.is_empty() {
        println!("Session '{session_id}' has no messages.");
        return Ok(());
    }

    for message in &transcript {
        println!("[{}] {}: {}", message.created_at, message.role, message.content);
    }
    Ok(())
}

/// Delete every message in one session.
#[inline]
pub async fn clear_session(config: &Config, session_id: &str) -> Result<()> {
    let store = ConversationStore::new(config.conversations_db_path()).await?;
    let deleted = store.clear_session(session_id).await?;
    println!("Deleted {deleted} messages from session '{session_id}'.");
    Ok(())
}

/// Append one message to a session's log.
#[inline]
pub async fn log_message(
    config: &Config,
    session_id: &str,
    role: Role,
    content: &str,
) -> Result<()> {
    let store = ConversationStore::new(config.conversations_db_path()).await?;
    let stored = store
        .append(NewMessage {
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            metadata: None,
        })
        .await?;
    println!(
        "Logged {} message {} to session '{}'.",
        stored.role, stored.id, stored.session_id
    );
    Ok(())
}
