//! Durable conversation log backed by SQLite.
//!
//! Sessions are implicit: a session exists exactly when at least one message
//! carries its id. Appends commit before returning, so an acknowledged
//! message survives a process crash.


pub mod models;
pub mod queries;

use crate::{RagError, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use models::{ConversationMessage, NewMessage, SessionSummary};
use queries::MessageQueries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct ConversationStore {
    pool: DbPool,
}

impl ConversationStore {
    /// Open (creating if needed) the conversation database at `db_path` and
    /// bring its schema up to date.
    #[inline]
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Full synchronous mode so an acknowledged append is on disk.
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(|e| {
                RagError::Storage(format!(
                    "Failed to open conversation database {}: {e}",
                    db_path.display()
                ))
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        info!("Running conversation database migrations");

        sqlx::migrate!("src/conversations/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RagError::Storage(format!("Failed to run schema migration: {e}")))?;

        debug!("Conversation database migrations completed");
        Ok(())
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Append one message to a session's log.
    #[inline]
    pub async fn append(&self, message: NewMessage) -> Result<ConversationMessage> {
        MessageQueries::append(&self.pool, message).await
    }

    /// Full transcript for one session in insertion order. Unknown sessions
    /// return an empty transcript.
    #[inline]
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<ConversationMessage>> {
        MessageQueries::for_session(&self.pool, session_id).await
    }

    /// Every known session with a one-line summary, most recently active
    /// first.
    #[inline]
    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let overviews = MessageQueries::session_overviews(&self.pool).await?;

        let mut sessions = Vec::with_capacity(overviews.len());
        for overview in overviews {
            let summary =
                MessageQueries::summarize_session(&self.pool, &overview.session_id).await?;
            sessions.push(SessionSummary {
                session_id: overview.session_id,
                message_count: overview.message_count,
                last_activity: overview.last_activity,
                summary,
            });
        }
        Ok(sessions)
    }

    /// Delete one message by id; `false` when no such message exists.
    #[inline]
    pub async fn delete_message(&self, id: i64) -> Result<bool> {
        MessageQueries::delete_message(&self.pool, id).await
    }

    /// Remove a session's messages entirely; returns how many were deleted.
    #[inline]
    pub async fn clear_session(&self, session_id: &str) -> Result<u64> {
        MessageQueries::clear_session(&self.pool, session_id).await
    }

    #[inline]
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
