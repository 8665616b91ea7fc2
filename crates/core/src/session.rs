//! Session and message domain types.
//!
//! These are the value objects that flow through the chat pipeline:
//! a question arrives for a session → context is gathered from prior messages →
//! the answer streams back as transient chunk messages → the question and the
//! full answer are persisted as two new messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a chat session (store-assigned, monotonically increasing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a persisted message. Ordering follows insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A conversation owned by one user.
///
/// Messages belong to exactly one session and are removed with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A chat message, either persisted or a transient streaming chunk.
///
/// Persisted messages carry an `id` and timestamps. Chunk events emitted
/// while an answer streams have neither: they are shaped like a message so
/// callers can render them uniformly, but they are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,

    pub session_id: SessionId,

    /// Free-form sender label: a user identifier or the assistant label.
    pub sender: String,

    pub content: String,

    /// Knowledge context the answer was grounded on (assistant messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_context: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// A streaming chunk event: not persisted, no id, no timestamps.
    pub fn transient(
        session_id: SessionId,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            session_id,
            sender: sender.into(),
            content: content.into(),
            retrieved_context: None,
            created_at: None,
            modified_at: None,
        }
    }

    /// Whether this message came back from the store.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

/// A message about to be written. The store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub session_id: SessionId,
    pub sender: String,
    pub content: String,
    pub retrieved_context: Option<String>,
}

impl NewMessage {
    /// A question from the caller. Never carries retrieved context.
    pub fn question(
        session_id: SessionId,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            sender: sender.into(),
            content: content.into(),
            retrieved_context: None,
        }
    }

    /// A complete assistant answer with the knowledge context it was grounded on.
    pub fn answer(
        session_id: SessionId,
        sender: impl Into<String>,
        content: impl Into<String>,
        retrieved_context: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            sender: sender.into(),
            content: content.into(),
            retrieved_context: Some(retrieved_context.into()),
        }
    }
}

/// One page of a session's messages in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub content: Vec<ChatMessage>,
    /// Zero-based page index.
    pub page: usize,
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
}

impl MessagePage {
    pub fn new(content: Vec<ChatMessage>, page: usize, size: usize, total_elements: usize) -> Self {
        let total_pages = if size == 0 {
            0
        } else {
            total_elements.div_ceil(size)
        };
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages,
        }
    }
}
