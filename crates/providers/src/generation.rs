//! The generation client: retry, blank-chunk filtering and the fallback
//! answer layered over a single-attempt [`GenerationBackend`].
//!
//! Callers see a finite sequence of non-blank chunks that always completes
//! normally. Failures are retried by re-issuing the whole call; once the
//! retries (or the overall deadline) are used up, exactly one fallback chunk
//! is sent and the sequence ends.

use std::sync::Arc;

use ragachat_config::DEFAULT_FALLBACK_MESSAGE;
use ragachat_core::{GenerationBackend, GenerationError};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::retry::RetryPolicy;

/// The caller's end of one `generate` call. Closes when the answer is complete.
pub type ChunkReceiver = mpsc::Receiver<String>;

const CHUNK_BUFFER: usize = 64;

/// How a single attempt ended without error.
enum AttemptEnd {
    /// The backend finished the stream.
    Completed,
    /// The caller went away; nothing more to do.
    Abandoned,
}

/// Streams answers from a generation backend with bounded retry.
#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    retry: RetryPolicy,
    fallback_message: String,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn fallback_message(&self) -> &str {
        &self.fallback_message
    }

    /// Start generating an answer for `prompt`.
    ///
    /// The work runs in a spawned task; dropping the receiver stops it and
    /// aborts the in-flight request.
    pub fn generate(&self, prompt: &str) -> ChunkReceiver {
        let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
        let client = self.clone();
        let prompt = prompt.to_string();

        tokio::spawn(async move {
            client.drive(prompt, tx).await;
        });

        rx
    }

    async fn drive(self, prompt: String, tx: mpsc::Sender<String>) {
        let deadline = self.retry.overall_deadline.map(|d| Instant::now() + d);
        let mut retries = 0u32;

        loop {
            let outcome = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.attempt(&prompt, &tx)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(GenerationError::Timeout(
                            "overall generation deadline elapsed".into(),
                        )),
                    }
                }
                None => self.attempt(&prompt, &tx).await,
            };

            let err = match outcome {
                Ok(AttemptEnd::Completed) => {
                    debug!(backend = %self.backend.name(), retries, "Generation completed");
                    return;
                }
                Ok(AttemptEnd::Abandoned) => {
                    info!(backend = %self.backend.name(), "Caller dropped generation stream");
                    return;
                }
                Err(err) => err,
            };

            let deadline_passed = deadline.is_some_and(|d| Instant::now() >= d);
            if deadline_passed || retries >= self.retry.max_retries || !self.retry.should_retry(&err)
            {
                error!(
                    backend = %self.backend.name(),
                    attempts = retries + 1,
                    error = %err,
                    "All generation attempts failed, sending fallback answer"
                );
                break;
            }

            retries += 1;
            let delay = self.retry.delay_for(retries);
            if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                error!(
                    backend = %self.backend.name(),
                    attempts = retries,
                    error = %err,
                    "Generation deadline would elapse before next retry, sending fallback answer"
                );
                break;
            }

            warn!(
                backend = %self.backend.name(),
                retry = retries,
                max_retries = self.retry.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying generation"
            );

            tokio::select! {
                _ = tx.closed() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let _ = tx.send(self.fallback_message.clone()).await;
    }

    /// One full call to the backend. Non-blank text is forwarded as it arrives.
    async fn attempt(
        &self,
        prompt: &str,
        tx: &mpsc::Sender<String>,
    ) -> Result<AttemptEnd, GenerationError> {
        let mut records = self.backend.open_stream(prompt).await?;

        loop {
            let item = tokio::select! {
                biased;
                _ = tx.closed() => return Ok(AttemptEnd::Abandoned),
                item = records.recv() => item,
            };

            let Some(item) = item else {
                return Ok(AttemptEnd::Completed);
            };

            let text = item?;
            if text.trim().is_empty() {
                continue;
            }
            if tx.send(text).await.is_err() {
                return Ok(AttemptEnd::Abandoned);
            }
        }
    }
}

impl std::fmt::Debug for GenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationClient")
            .field("backend", &self.backend.name())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
