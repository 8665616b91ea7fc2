//! SQLite backend.
//!
//! Uses a single SQLite database file with three tables:
//! - `chat_sessions`: one row per conversation
//! - `chat_messages`: messages, removed with their session via `ON DELETE CASCADE`
//! - `knowledge_base`: documents with their embedding as a little-endian `f32` BLOB
//!
//! SQLite has no vector index, so similarity search loads the embedded
//! documents and ranks them with [`vector::rank_documents`].

use crate::vector;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ragachat_core::{
    ChatMessage, ChatStore, EmbeddingVector, KnowledgeDocument, KnowledgeStore, MessageId,
    MessagePage, NewKnowledgeDocument, NewMessage, ScoredDocument, Session, SessionId, StoreError,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite-backed chat and knowledge store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn connect(path: &str, max_connections: u32) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to ":memory:" is its own database, so keep exactly one alive.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_sessions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL,
                title       TEXT NOT NULL,
                favorite    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL,
                modified_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("chat_sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id        INTEGER NOT NULL
                                  REFERENCES chat_sessions (id) ON DELETE CASCADE,
                sender            TEXT NOT NULL,
                content           TEXT NOT NULL,
                retrieved_context TEXT,
                created_at        TEXT NOT NULL,
                modified_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("chat_messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_base (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL UNIQUE,
                content     TEXT NOT NULL,
                embedding   BLOB,
                created_at  TEXT NOT NULL,
                modified_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("knowledge_base table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_sessions_user ON chat_sessions(user_id, modified_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_messages_session ON chat_messages(session_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_session(row: &SqliteRow) -> Result<Session, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let user_id: String = row
            .try_get("user_id")
            .map_err(|e| StoreError::QueryFailed(format!("user_id column: {e}")))?;
        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let favorite: bool = row
            .try_get("favorite")
            .map_err(|e| StoreError::QueryFailed(format!("favorite column: {e}")))?;

        Ok(Session {
            id: SessionId(id),
            user_id,
            title,
            favorite,
            created_at: parse_timestamp(row, "created_at")?,
            modified_at: parse_timestamp(row, "modified_at")?,
        })
    }

    fn row_to_message(row: &SqliteRow) -> Result<ChatMessage, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let session_id: i64 = row
            .try_get("session_id")
            .map_err(|e| StoreError::QueryFailed(format!("session_id column: {e}")))?;
        let sender: String = row
            .try_get("sender")
            .map_err(|e| StoreError::QueryFailed(format!("sender column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let retrieved_context: Option<String> = row
            .try_get("retrieved_context")
            .map_err(|e| StoreError::QueryFailed(format!("retrieved_context column: {e}")))?;

        Ok(ChatMessage {
            id: Some(MessageId(id)),
            session_id: SessionId(session_id),
            sender,
            content,
            retrieved_context,
            created_at: Some(parse_timestamp(row, "created_at")?),
            modified_at: Some(parse_timestamp(row, "modified_at")?),
        })
    }

    fn row_to_document(row: &SqliteRow) -> Result<KnowledgeDocument, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let embedding: Option<Vec<u8>> = row
            .try_get("embedding")
            .map_err(|e| StoreError::QueryFailed(format!("embedding column: {e}")))?;

        Ok(KnowledgeDocument {
            id,
            title,
            content,
            embedding: embedding.map(|blob| EmbeddingVector::from_le_bytes(&blob)),
            created_at: parse_timestamp(row, "created_at")?,
            modified_at: parse_timestamp(row, "modified_at")?,
        })
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = row
        .try_get(column)
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("{column} is not a timestamp: {e}")))
}

#[async_trait]
impl ChatStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_session(&self, user_id: &str, title: &str) -> Result<Session, StoreError> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            "INSERT INTO chat_sessions (user_id, title, favorite, created_at, modified_at)
             VALUES (?1, ?2, 0, ?3, ?3)",
        )
        .bind(user_id)
        .bind(title)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Create session: {e}")))?;

        let id = SessionId(result.last_insert_rowid());
        self.find_session(id)
            .await?
            .ok_or_else(|| StoreError::Storage(format!("session {id} vanished after insert")))
    }

    async fn find_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE id = ?1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Find session: {e}")))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn sessions_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_sessions WHERE user_id = ?1 ORDER BY modified_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("List sessions: {e}")))?;

        rows.iter().map(Self::row_to_session).collect()
    }

    async fn update_session(&self, session: &Session) -> Result<Option<Session>, StoreError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET title = ?1, favorite = ?2, modified_at = ?3 WHERE id = ?4",
        )
        .bind(&session.title)
        .bind(session.favorite)
        .bind(format_timestamp(Utc::now()))
        .bind(session.id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Update session: {e}")))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_session(session.id).await
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Delete session: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            "INSERT INTO chat_messages (session_id, sender, content, retrieved_context, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        )
        .bind(message.session_id.0)
        .bind(&message.sender)
        .bind(&message.content)
        .bind(&message.retrieved_context)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Append message: {e}")))?;

        let row = sqlx::query("SELECT * FROM chat_messages WHERE id = ?1")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Read back message: {e}")))?;

        Self::row_to_message(&row)
    }

    async fn recent_messages(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(session_id.0)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Recent messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn messages_page(
        &self,
        session_id: SessionId,
        page: usize,
        size: usize,
    ) -> Result<MessagePage, StoreError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1")
                .bind(session_id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("Count messages: {e}")))?;
        let total = total as usize;

        let Some((limit, offset)) = crate::page_window(page, size) else {
            return Ok(MessagePage::new(Vec::new(), page, size, total));
        };

        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE session_id = ?1 ORDER BY id ASC LIMIT ?2 OFFSET ?3",
        )
        .bind(session_id.0)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Page messages: {e}")))?;

        let content = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MessagePage::new(content, page, size, total))
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn search_similar(
        &self,
        query: &EmbeddingVector,
        top_n: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM knowledge_base WHERE embedding IS NOT NULL ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("Load knowledge: {e}")))?;

        let documents = rows
            .iter()
            .map(Self::row_to_document)
            .collect::<Result<Vec<_>, _>>()?;

        vector::rank_documents(&documents, query, top_n, min_score)
    }

    async fn exists_by_title(&self, title: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_base WHERE title = ?1")
            .bind(title)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Title lookup: {e}")))?;
        Ok(count > 0)
    }

    async fn insert_document(
        &self,
        document: NewKnowledgeDocument,
    ) -> Result<KnowledgeDocument, StoreError> {
        let now = format_timestamp(Utc::now());
        let result = sqlx::query(
            "INSERT INTO knowledge_base (title, content, embedding, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
        )
        .bind(&document.title)
        .bind(&document.content)
        .bind(document.embedding.to_le_bytes())
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Insert document: {e}")))?;

        let row = sqlx::query("SELECT * FROM knowledge_base WHERE id = ?1")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Read back document: {e}")))?;

        Self::row_to_document(&row)
    }

    async fn count_documents(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_base")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Count documents: {e}")))?;
        Ok(count as usize)
    }
}
