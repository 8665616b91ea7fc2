//! Knowledge retrieval and ingestion.
//!
//! Retrieval embeds the question, asks the knowledge store for documents whose
//! cosine similarity clears the threshold, and joins their contents into the
//! "knowledge context" that is fed to the prompt and stored with the answer.

use std::sync::Arc;

use ragachat_core::{
    Embedder, EmbeddingVector, Error, KnowledgeDocument, KnowledgeStore, NewKnowledgeDocument,
    ScoredDocument, StoreError,
};
use tracing::{debug, info};

/// Minimum similarity for a document to be used.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.20;

/// Maximum number of documents per question.
pub const DEFAULT_TOP_N: usize = 5;

#[derive(Clone)]
pub struct KnowledgeRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
    top_n: usize,
    threshold: f32,
}

impl KnowledgeRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            embedder,
            store,
            top_n: DEFAULT_TOP_N,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Documents scoring at least the threshold, best first, at most `top_n`.
    /// Never an error just because nothing matched.
    pub async fn search(
        &self,
        query: &EmbeddingVector,
        top_n: usize,
    ) -> Result<Vec<ScoredDocument>, StoreError> {
        let mut hits = self
            .store
            .search_similar(query, top_n, self.threshold)
            .await?;

        // Backends already filter; keep the contract even for a lax one.
        hits.retain(|hit| hit.score >= self.threshold);
        hits.truncate(top_n);

        for hit in &hits {
            debug!(
                document_id = hit.document.id,
                title = %hit.document.title,
                score = hit.score,
                "Knowledge hit"
            );
        }
        Ok(hits)
    }

    /// Embed `question` and render the matching documents as knowledge context.
    ///
    /// Embedding failures are fatal for the request.
    pub async fn context_for(&self, question: &str) -> Result<String, Error> {
        let query = self.embedder.embed(question).await?;
        let hits = self.search(&query, self.top_n).await?;
        info!(hits = hits.len(), "Retrieved knowledge context");
        Ok(render_context(&hits))
    }
}

/// Contents of the hits joined by newline, in ranked order.
pub fn render_context(hits: &[ScoredDocument]) -> String {
    hits.iter()
        .map(|hit| hit.document.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result of a single ingestion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Inserted(KnowledgeDocument),
    /// A document with this title already exists; nothing was written.
    Skipped { title: String },
}

/// Adds documents to the knowledge base, once per title.
#[derive(Clone)]
pub struct KnowledgeIngestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn KnowledgeStore>,
}

impl KnowledgeIngestor {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed and store `content` under `title` unless the title exists.
    ///
    /// The existence check runs before embedding, so re-ingesting costs no
    /// embedding call.
    pub async fn ingest(&self, title: &str, content: &str) -> Result<IngestOutcome, Error> {
        if title.trim().is_empty() {
            return Err(Error::InvalidRequest("document title must not be blank".into()));
        }

        if self.store.exists_by_title(title).await? {
            debug!(title, "Knowledge document already present, skipping");
            return Ok(IngestOutcome::Skipped {
                title: title.to_string(),
            });
        }

        let embedding = self.embedder.embed(content).await?;
        let document = self
            .store
            .insert_document(NewKnowledgeDocument {
                title: title.to_string(),
                content: content.to_string(),
                embedding,
            })
            .await?;

        info!(id = document.id, title, "Ingested knowledge document");
        Ok(IngestOutcome::Inserted(document))
    }
}
