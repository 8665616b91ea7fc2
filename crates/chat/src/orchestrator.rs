//! The chat orchestrator: one question in, a stream of answer chunks out,
//! and both sides of the exchange persisted.
//!
//! # Flow of `add_message`
//!
//! 1. Validate the request and resolve the session (`NotFound` otherwise)
//! 2. Gather conversation history and knowledge context concurrently
//! 3. Persist the question
//! 4. Stream the answer, forwarding every chunk as a transient message
//! 5. Fold the chunks into the full answer
//! 6. Persist the answer with the knowledge context it was grounded on
//!
//! Steps 1–3 run before `add_message` returns, so their failures reach the
//! caller as an `Err`. Steps 4–6 run in a spawned task feeding the returned
//! receiver. If the receiver is dropped before the answer completes, the
//! generation is abandoned and no answer is persisted.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use ragachat_core::{ChatMessage, ChatStore, Error, MessagePage, NewMessage, Session, SessionId};
use ragachat_providers::GenerationClient;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug, error, info, info_span};

use crate::history::HistoryAssembler;
use crate::knowledge::KnowledgeRetriever;
use crate::prompt::PromptComposer;
use crate::session_locks::{SessionGuard, SessionLocks};

/// Default sender label of assistant messages.
pub const DEFAULT_ASSISTANT_LABEL: &str = "AI";

/// Events of one answer: transient chunk messages, then the channel closes.
/// An `Err` item means the answer could not be persisted.
pub type ChatEventStream = mpsc::Receiver<Result<ChatMessage, Error>>;

const EVENT_BUFFER: usize = 64;

/// The caller stopped listening before the answer completed.
struct Abandoned;

pub struct ChatOrchestrator {
    store: Arc<dyn ChatStore>,
    history: HistoryAssembler,
    retriever: KnowledgeRetriever,
    composer: PromptComposer,
    generation: GenerationClient,
    locks: Option<Arc<SessionLocks>>,
    assistant_label: String,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn ChatStore>,
        retriever: KnowledgeRetriever,
        generation: GenerationClient,
    ) -> Self {
        Self {
            history: HistoryAssembler::new(store.clone()),
            store,
            retriever,
            composer: PromptComposer::default(),
            generation,
            locks: Some(Arc::new(SessionLocks::new())),
            assistant_label: DEFAULT_ASSISTANT_LABEL.to_string(),
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history = self.history.with_limit(limit);
        self
    }

    pub fn with_composer(mut self, composer: PromptComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_assistant_label(mut self, label: impl Into<String>) -> Self {
        self.assistant_label = label.into();
        self
    }

    /// Serialize concurrent `add_message` calls per session (on by default).
    pub fn with_session_serialization(mut self, enabled: bool) -> Self {
        self.locks = enabled.then(|| Arc::new(SessionLocks::new()));
        self
    }

    pub fn assistant_label(&self) -> &str {
        &self.assistant_label
    }

    /// Ask `content` in session `session_id` on behalf of `sender`.
    ///
    /// Returns once the question is persisted. The receiver yields the answer
    /// chunks in arrival order and closes after the answer is persisted.
    pub async fn add_message(
        &self,
        session_id: SessionId,
        sender: &str,
        content: &str,
    ) -> Result<ChatEventStream, Error> {
        let span = info_span!(
            "add_message",
            request_id = %uuid::Uuid::new_v4(),
            session_id = %session_id,
        );

        let (prompt, knowledge_context, guard) = self
            .prepare(session_id, sender, content)
            .instrument(span.clone())
            .await?;

        let chunks = self.generation.generate(&prompt);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let task = AnswerTask {
            store: self.store.clone(),
            session_id,
            assistant_label: self.assistant_label.clone(),
            knowledge_context,
            _guard: guard,
        };
        tokio::spawn(task.run(chunks, tx).instrument(span));

        Ok(rx)
    }

    /// Validation, context gathering and question persistence.
    async fn prepare(
        &self,
        session_id: SessionId,
        sender: &str,
        content: &str,
    ) -> Result<(String, String, Option<SessionGuard>), Error> {
        if content.trim().is_empty() {
            return Err(Error::InvalidRequest("message content must not be blank".into()));
        }
        if sender.trim().is_empty() {
            return Err(Error::InvalidRequest("sender must not be blank".into()));
        }

        self.require_session(session_id).await?;

        let guard = match &self.locks {
            Some(locks) => Some(locks.lock(session_id).await),
            None => None,
        };

        let (conversation_context, knowledge_context) = tokio::try_join!(
            async {
                self.history
                    .recent_context(session_id)
                    .await
                    .map_err(Error::from)
            },
            self.retriever.context_for(content),
        )?;

        let question = self
            .store
            .append_message(NewMessage::question(session_id, sender, content))
            .await?;
        debug!(message_id = ?question.id, "Persisted question");

        let prompt = self
            .composer
            .compose(&conversation_context, &knowledge_context, content);

        Ok((prompt, knowledge_context, guard))
    }

    // ── Session passthroughs ──────────────────────────────────────────────

    pub async fn create_session(&self, user_id: &str, title: &str) -> Result<Session, Error> {
        if user_id.trim().is_empty() {
            return Err(Error::InvalidRequest("userId must not be blank".into()));
        }
        let session = self.store.create_session(user_id, title).await?;
        info!(session_id = %session.id, user_id, "Created session");
        Ok(session)
    }

    /// A user's sessions, most recently modified first.
    pub async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>, Error> {
        Ok(self.store.sessions_by_user(user_id).await?)
    }

    pub async fn session(&self, session_id: SessionId) -> Result<Session, Error> {
        self.require_session(session_id).await
    }

    /// One page of a session's messages in insertion order.
    pub async fn messages(
        &self,
        session_id: SessionId,
        page: usize,
        size: usize,
    ) -> Result<MessagePage, Error> {
        if size == 0 {
            return Err(Error::InvalidRequest("page size must be greater than 0".into()));
        }
        self.require_session(session_id).await?;
        Ok(self.store.messages_page(session_id, page, size).await?)
    }

    pub async fn rename_session(&self, session_id: SessionId, title: &str) -> Result<Session, Error> {
        let mut session = self.require_session(session_id).await?;
        session.title = title.to_string();
        self.save_session(&session).await
    }

    pub async fn set_favorite(&self, session_id: SessionId, favorite: bool) -> Result<Session, Error> {
        let mut session = self.require_session(session_id).await?;
        session.favorite = favorite;
        self.save_session(&session).await
    }

    /// Delete a session together with all of its messages.
    pub async fn delete_session(&self, session_id: SessionId) -> Result<(), Error> {
        if !self.store.delete_session(session_id).await? {
            return Err(Error::session_not_found(session_id));
        }
        info!(session_id = %session_id, "Deleted session");
        Ok(())
    }

    async fn require_session(&self, session_id: SessionId) -> Result<Session, Error> {
        self.store
            .find_session(session_id)
            .await?
            .ok_or_else(|| Error::session_not_found(session_id))
    }

    async fn save_session(&self, session: &Session) -> Result<Session, Error> {
        self.store
            .update_session(session)
            .await?
            .ok_or_else(|| Error::session_not_found(session.id))
    }
}

/// Streaming, accumulation and answer persistence for one question.
struct AnswerTask {
    store: Arc<dyn ChatStore>,
    session_id: SessionId,
    assistant_label: String,
    knowledge_context: String,
    /// Released when the answer is persisted or abandoned.
    _guard: Option<SessionGuard>,
}

impl AnswerTask {
    async fn run(
        self,
        chunks: mpsc::Receiver<String>,
        tx: mpsc::Sender<Result<ChatMessage, Error>>,
    ) {
        let mut chunks = ReceiverStream::new(chunks).take_until(Box::pin(tx.closed()));
        let answer = chunks
            .by_ref()
            .map(Ok::<_, Abandoned>)
            .try_fold(String::new(), |mut answer, chunk| {
                let event = ChatMessage::transient(
                    self.session_id,
                    self.assistant_label.as_str(),
                    chunk.as_str(),
                );
                let tx = &tx;
                async move {
                    tx.send(Ok(event)).await.map_err(|_| Abandoned)?;
                    answer.push_str(&chunk);
                    Ok(answer)
                }
            })
            .await;

        // Only a caller that left before the stream ended abandons the answer.
        let caller_left = chunks.take_result().is_some();
        let answer = match answer {
            Ok(answer) if !caller_left => answer,
            _ => {
                info!("Caller went away before the answer completed; answer not persisted");
                return;
            }
        };

        let message = NewMessage::answer(
            self.session_id,
            self.assistant_label.as_str(),
            answer,
            self.knowledge_context.as_str(),
        );

        match self.store.append_message(message).await {
            Ok(stored) => {
                debug!(
                    message_id = ?stored.id,
                    answer_len = stored.content.len(),
                    "Persisted answer"
                );
            }
            Err(e) => {
                error!(error = %e, "Failed to persist answer");
                let _ = tx.send(Err(e.into())).await;
            }
        }
    }
}
