//! Pure-Rust cosine ranking for backends without a vector index.
//!
//! Scores are `1 - cosine_distance`, i.e. plain cosine similarity, so the
//! in-memory and SQLite backends agree with pgvector's `<=>` operator.

use ragachat_core::{EmbeddingVector, KnowledgeDocument, ScoredDocument, StoreError};

/// Cosine similarity in [-1, 1]. Zero vectors score 0.0.
///
/// Vectors of different dimensionality cannot be compared.
pub fn cosine_similarity(a: &EmbeddingVector, b: &EmbeddingVector) -> Result<f32, StoreError> {
    a.ensure_comparable(b)?;

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return Ok(0.0);
    }

    Ok((dot / denom) as f32)
}

/// Rank documents by similarity to `query`.
///
/// Keeps documents scoring at least `min_score`, best first, at most `top_n`.
/// Documents without an embedding are skipped. The sort is stable, so equal
/// scores keep the input (storage) order.
pub fn rank_documents<'a>(
    documents: impl IntoIterator<Item = &'a KnowledgeDocument>,
    query: &EmbeddingVector,
    top_n: usize,
    min_score: f32,
) -> Result<Vec<ScoredDocument>, StoreError> {
    let mut scored = Vec::new();
    for document in documents {
        let Some(embedding) = document.embedding.as_ref() else {
            continue;
        };
        let score = cosine_similarity(embedding, query)?;
        if score >= min_score {
            scored.push(ScoredDocument {
                document: document.clone(),
                score,
            });
        }
    }

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_n);
    Ok(scored)
}
