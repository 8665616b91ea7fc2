//! Persistence traits: sessions, messages, and the knowledge base.
//!
//! The orchestration layer owns sessions through these traits; the store
//! owns ids and timestamps. Implementations: SQLite, PostgreSQL + pgvector,
//! and in-memory (for tests and ephemeral runs).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::knowledge::{EmbeddingVector, KnowledgeDocument, NewKnowledgeDocument, ScoredDocument};
use crate::session::{ChatMessage, MessagePage, NewMessage, Session, SessionId};

/// Sessions and their messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "postgres", "in_memory").
    fn name(&self) -> &str;

    /// Create a new, non-favorite session.
    async fn create_session(&self, user_id: &str, title: &str) -> Result<Session, StoreError>;

    async fn find_session(&self, id: SessionId) -> Result<Option<Session>, StoreError>;

    /// All sessions of a user, most recently modified first.
    async fn sessions_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError>;

    /// Persist title and favorite flag of an existing session, bumping `modified_at`.
    /// Returns `None` if the session no longer exists.
    async fn update_session(&self, session: &Session) -> Result<Option<Session>, StoreError>;

    /// Delete a session and, by cascade, all of its messages.
    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError>;

    /// Append a message. Fails if the session does not exist.
    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;

    /// Up to `limit` most recent messages of a session, newest first.
    async fn recent_messages(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// One page of a session's messages in insertion order.
    async fn messages_page(
        &self,
        session_id: SessionId,
        page: usize,
        size: usize,
    ) -> Result<MessagePage, StoreError>;
}

/// The read-mostly knowledge base.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    fn name(&self) -> &str;

    /// Documents whose similarity `1 - cosine_distance(embedding, query)` is at
    /// least `min_score`, best first, at most `top_n`. Ties keep storage order.
    /// Documents without an embedding are never returned.
    async fn search_similar(
        &self,
        query: &EmbeddingVector,
        top_n: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredDocument>, StoreError>;

    async fn exists_by_title(&self, title: &str) -> Result<bool, StoreError>;

    /// Insert a new document. Titles are unique; inserting a duplicate is an error.
    async fn insert_document(
        &self,
        document: NewKnowledgeDocument,
    ) -> Result<KnowledgeDocument, StoreError>;

    async fn count_documents(&self) -> Result<usize, StoreError>;
}
