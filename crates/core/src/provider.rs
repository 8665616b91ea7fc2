//! Remote model traits: the embedding service and the generation endpoint.
//!
//! Implementations: Cohere and OpenAI-compatible embedders, Gemini and
//! OpenAI-compatible streaming generation backends.

use async_trait::async_trait;

use crate::error::{EmbeddingError, GenerationError};
use crate::knowledge::EmbeddingVector;

/// Receiving half of one generation attempt.
///
/// Each item is the text extracted from one response record, possibly empty.
/// An `Err` item ends the attempt; the channel closing ends it normally.
pub type RecordReceiver = tokio::sync::mpsc::Receiver<Result<String, GenerationError>>;

/// Converts text into a fixed-dimension vector via a remote service.
///
/// One outbound call per invocation, no caching, no retry: a failed
/// embedding is a hard stop for the current request.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// A human-readable name for this embedder (e.g., "cohere").
    fn name(&self) -> &str;

    /// Embed `text`. Empty input is rejected with [`EmbeddingError::EmptyInput`].
    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError>;
}

/// A single streaming call to a remote LLM endpoint.
///
/// Backends do not retry. Retry, backoff, blank-chunk filtering and the
/// fallback answer are layered on top by the generation client.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// A human-readable name for this backend (e.g., "gemini").
    fn name(&self) -> &str;

    /// Open one streaming request for `prompt`.
    ///
    /// Dropping the returned receiver aborts the underlying request.
    async fn open_stream(&self, prompt: &str) -> Result<RecordReceiver, GenerationError>;
}
