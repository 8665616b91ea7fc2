//! Knowledge-base domain types.
//!
//! Documents are produced once by ingestion and are read-only afterwards.
//! Retrieval compares a query [`EmbeddingVector`] against each document's
//! embedding and keeps the ones whose similarity clears a threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EmbeddingError, StoreError};

/// Default dimensionality of stored and query embeddings.
pub const DEFAULT_DIMENSIONS: usize = 1024;

/// A fixed-length embedding. Has no identity beyond its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Wrap `values`, rejecting anything that is not exactly `expected` long.
    pub fn with_dimensions(values: Vec<f32>, expected: usize) -> Result<Self, EmbeddingError> {
        if values.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self(values))
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Fail unless `other` has the same dimensionality.
    pub fn ensure_comparable(&self, other: &EmbeddingVector) -> Result<(), StoreError> {
        if self.dimensions() != other.dimensions() {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions(),
                actual: other.dimensions(),
            });
        }
        Ok(())
    }

    /// Render as a pgvector literal: `[v1,v2,...,vn]`.
    pub fn to_pgvector_literal(&self) -> String {
        format!(
            "[{}]",
            self.0
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",")
        )
    }

    /// Little-endian byte encoding used for BLOB columns.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Inverse of [`to_le_bytes`](Self::to_le_bytes). Trailing partial words are dropped.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        Self(
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        )
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// A stored knowledge document. `title` is unique across the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDocument {
    pub id: i64,
    pub title: String,
    pub content: String,
    #[serde(skip)]
    pub embedding: Option<EmbeddingVector>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A document handed to the store by ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewKnowledgeDocument {
    pub title: String,
    pub content: String,
    pub embedding: EmbeddingVector,
}

/// A retrieval hit: the document and its similarity to the query
/// (`1 - cosine distance`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: KnowledgeDocument,
    pub score: f32,
}
