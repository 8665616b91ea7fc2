//! Scripted collaborators shared by this crate's unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ragachat_core::{
    Embedder, EmbeddingError, EmbeddingVector, GenerationBackend, GenerationError, RecordReceiver,
};
use tokio::sync::mpsc;

const VOCABULARY: [&str; 8] = [
    "java",
    "spring",
    "boot",
    "pasta",
    "water",
    "language",
    "programming",
    "rust",
];

/// Bag-of-words embedder over a tiny fixed vocabulary.
pub struct KeywordEmbedder {
    failure: Option<EmbeddingError>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            failure: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: EmbeddingError) -> Self {
        Self {
            failure: Some(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut values = vec![0.0f32; VOCABULARY.len()];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
        {
            if let Some(i) = VOCABULARY.iter().position(|v| *v == word) {
                values[i] += 1.0;
            }
        }
        Ok(EmbeddingVector::new(values))
    }
}

/// One scripted generation attempt.
#[derive(Clone)]
pub enum Attempt {
    Refuse(GenerationError),
    Stream(Vec<String>),
    /// Send the chunks, then keep the stream open until the reader goes away.
    StreamThenHang(Vec<String>),
}

/// Generation backend replaying scripted attempts; refuses once the script runs out.
pub struct ScriptedBackend {
    attempts: Mutex<VecDeque<Attempt>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(attempts: Vec<Attempt>) -> Self {
        Self {
            attempts: Mutex::new(attempts.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(chunks: &[&str]) -> Self {
        Self::new(vec![Attempt::Stream(
            chunks.iter().map(|c| c.to_string()).collect(),
        )])
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open_stream(&self, prompt: &str) -> Result<RecordReceiver, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let attempt = self
            .attempts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Attempt::Refuse(GenerationError::Network("script exhausted".into())));

        match attempt {
            Attempt::Refuse(err) => Err(err),
            Attempt::Stream(chunks) => {
                let (tx, rx) = mpsc::channel(16);
                tokio::spawn(async move {
                    for chunk in chunks {
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                });
                Ok(rx)
            }
            Attempt::StreamThenHang(chunks) => {
                let (tx, rx) = mpsc::channel(16);
                tokio::spawn(async move {
                    for chunk in chunks {
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                    tx.closed().await;
                });
                Ok(rx)
            }
        }
    }
}
