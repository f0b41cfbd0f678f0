
use super::models::{ConversationMessage, NewMessage, Role, SessionOverview};
use crate::{RagError, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

/// Session summaries truncate the first user message to this many characters.
const SUMMARY_MAX_CHARS: usize = 100;

fn storage_error(action: &str, source: sqlx::Error) -> RagError {
    RagError::Storage(format!("{action}: {source}"))
}

pub struct MessageQueries;

impl MessageQueries {
    /// Append one message and return the stored row. The log is append-only;
    /// rows are never updated in place.
    #[inline]
    pub async fn append(pool: &SqlitePool, message: NewMessage) -> Result<ConversationMessage> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO conversations (session_id, role, content, created_at, metadata) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&message.session_id)
        .bind(message.role)
        .bind(&message.content)
        .bind(now)
        .bind(&message.metadata)
        .execute(pool)
        .await
        .map_err(|e| storage_error("Failed to append conversation message", e))?
        .last_insert_rowid();

        debug!(
            "Appended {} message {} to session {}",
            message.role, id, message.session_id
        );

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| RagError::Storage("Appended message not found on re-read".to_string()))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<ConversationMessage>> {
        sqlx::query_as::<_, ConversationMessage>(
            "SELECT id, session_id, role, content, created_at, metadata \
             FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| storage_error("Failed to get conversation message by id", e))
    }

    /// Full transcript for one session in insertion order. Rowid breaks ties
    /// between messages sharing a timestamp.
    #[inline]
    pub async fn for_session(
        pool: &SqlitePool,
        session_id: &str,
    ) -> Result<Vec<ConversationMessage>> {
        sqlx::query_as::<_, ConversationMessage>(
            "SELECT id, session_id, role, content, created_at, metadata \
             FROM conversations WHERE session_id = ? ORDER BY created_at, id",
        )
        .bind(session_id)
        .fetch_all(pool)
        .await
        .map_err(|e| storage_error("Failed to read session transcript", e))
    }

    /// All known sessions, most recently active first.
    #[inline]
    pub async fn session_overviews(pool: &SqlitePool) -> Result<Vec<SessionOverview>> {
        sqlx::query_as::<_, SessionOverview>(
            "SELECT session_id, \
                    COUNT(*) AS message_count, \
                    MAX(created_at) AS last_activity \
             FROM conversations \
             GROUP BY session_id \
             ORDER BY last_activity DESC",
        )
        .fetch_all(pool)
        .await
        .map_err(|e| storage_error("Failed to list sessions", e))
    }

    /// Delete one message by id; returns whether a row was removed.
    #[inline]
    pub async fn delete_message(pool: &SqlitePool, id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| storage_error("Failed to delete conversation message", e))?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// Delete every message in a session; returns the number of rows removed.
    #[inline]
    pub async fn clear_session(pool: &SqlitePool, session_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM conversations WHERE session_id = ?")
            .bind(session_id)
            .execute(pool)
            .await
            .map_err(|e| storage_error("Failed to clear session", e))?
            .rows_affected();

        debug!("Cleared {} messages from session {}", deleted, session_id);
        Ok(deleted)
    }

    /// One-line session summary: the first user message, truncated. `None`
    /// when the session has no user message yet.
    #[inline]
    pub async fn summarize_session(pool: &SqlitePool, session_id: &str) -> Result<Option<String>> {
        let first: Option<String> = sqlx::query_scalar(
            "SELECT content FROM conversations \
             WHERE session_id = ? AND role = ? \
             ORDER BY created_at, id LIMIT 1",
        )
        .bind(session_id)
        .bind(Role::User)
        .fetch_optional(pool)
        .await
        .map_err(|e| storage_error("Failed to summarize session", e))?;

        let Some(content) = first else {
            return Ok(None);
        };

        if content.chars().count() <= SUMMARY_MAX_CHARS {
            return Ok(Some(content));
        }
        let truncated: String = content.chars().take(SUMMARY_MAX_CHARS).collect();
        Ok(Some(format!("{truncated}...")))
    }
}
