//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use ragachat_core::{
    ChatMessage, ChatStore, EmbeddingVector, KnowledgeDocument, KnowledgeStore, MessageId,
    MessagePage, NewKnowledgeDocument, NewMessage, ScoredDocument, Session, SessionId, StoreError,
};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::vector;

#[derive(Default)]
struct State {
    sessions: Vec<Session>,
    messages: Vec<ChatMessage>,
    documents: Vec<KnowledgeDocument>,
    last_session_id: i64,
    last_message_id: i64,
    last_document_id: i64,
}

/// Sessions, messages and knowledge documents kept in `Vec`s.
/// Ids are assigned in insertion order, starting at 1.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_session(&self, user_id: &str, title: &str) -> Result<Session, StoreError> {
        let mut state = self.state.write().await;
        state.last_session_id += 1;
        let now = Utc::now();
        let session = Session {
            id: SessionId(state.last_session_id),
            user_id: user_id.to_string(),
            title: title.to_string(),
            favorite: false,
            created_at: now,
            modified_at: now,
        };
        state.sessions.push(session.clone());
        Ok(session)
    }

    async fn find_session(&self, id: SessionId) -> Result<Option<Session>, StoreError> {
        let state = self.state.read().await;
        Ok(state.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn sessions_by_user(&self, user_id: &str) -> Result<Vec<Session>, StoreError> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn update_session(&self, session: &Session) -> Result<Option<Session>, StoreError> {
        let mut state = self.state.write().await;
        let Some(stored) = state.sessions.iter_mut().find(|s| s.id == session.id) else {
            return Ok(None);
        };
        stored.title = session.title.clone();
        stored.favorite = session.favorite;
        stored.modified_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn delete_session(&self, id: SessionId) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|s| s.id != id);
        if state.sessions.len() == before {
            return Ok(false);
        }
        state.messages.retain(|m| m.session_id != id);
        Ok(true)
    }

    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let mut state = self.state.write().await;
        if !state.sessions.iter().any(|s| s.id == message.session_id) {
            return Err(StoreError::QueryFailed(format!(
                "session {} does not exist",
                message.session_id
            )));
        }

        state.last_message_id += 1;
        let now = Utc::now();
        let stored = ChatMessage {
            id: Some(MessageId(state.last_message_id)),
            session_id: message.session_id,
            sender: message.sender,
            content: message.content,
            retrieved_context: message.retrieved_context,
            created_at: Some(now),
            modified_at: Some(now),
        };
        state.messages.push(stored.clone());
        Ok(stored)
    }

    async fn recent_messages(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .rev()
            .filter(|m| m.session_id == session_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn messages_page(
        &self,
        session_id: SessionId,
        page: usize,
        size: usize,
    ) -> Result<MessagePage, StoreError> {
        let state = self.state.read().await;
        let all: Vec<&ChatMessage> = state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .collect();
        let content = all
            .iter()
            .skip(page.saturating_mul(size))
            .take(size)
            .map(|m| (*m).clone())
            .collect();
        Ok(MessagePage::new(content, page, size, all.len()))
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn search_similar(
        &self,
        query: &EmbeddingVector,
        top_n: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let state = self.state.read().await;
        vector::rank_documents(&state.documents, query, top_n, min_score)
    }

    async fn exists_by_title(&self, title: &str) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state.documents.iter().any(|d| d.title == title))
    }

    async fn insert_document(
        &self,
        document: NewKnowledgeDocument,
    ) -> Result<KnowledgeDocument, StoreError> {
        let mut state = self.state.write().await;
        if state.documents.iter().any(|d| d.title == document.title) {
            return Err(StoreError::QueryFailed(format!(
                "duplicate knowledge title '{}'",
                document.title
            )));
        }

        state.last_document_id += 1;
        let now = Utc::now();
        let stored = KnowledgeDocument {
            id: state.last_document_id,
            title: document.title,
            content: document.content,
            embedding: Some(document.embedding),
            created_at: now,
            modified_at: now,
        };
        state.documents.push(stored.clone());
        Ok(stored)
    }

    async fn count_documents(&self) -> Result<usize, StoreError> {
        Ok(self.state.read().await.documents.len())
    }
}
