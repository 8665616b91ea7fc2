//! Conversation context from a session's most recent messages.

use std::sync::Arc;

use ragachat_core::{ChatMessage, ChatStore, SessionId, StoreError};
use tracing::debug;

/// Default number of prior messages fed into the prompt.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Builds the "conversation history" section of the prompt.
///
/// Messages are joined newest first, exactly in fetch order.
#[derive(Clone)]
pub struct HistoryAssembler {
    store: Arc<dyn ChatStore>,
    limit: usize,
}

impl HistoryAssembler {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self {
            store,
            limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Up to `limit` most recent messages of `session_id`, newline-joined,
    /// newest first. A session without messages yields `""`.
    pub async fn recent_context(&self, session_id: SessionId) -> Result<String, StoreError> {
        let messages = self.store.recent_messages(session_id, self.limit).await?;
        debug!(session_id = %session_id, count = messages.len(), "Assembled history");
        Ok(join_contents(&messages))
    }
}

/// Newline-join message contents in the given order.
pub fn join_contents(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
