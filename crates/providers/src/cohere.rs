//! Cohere embedding client.
//!
//! One `POST /v1/embed` per call with `{texts, model, input_type}`; the first
//! returned vector is the embedding. No caching and no retry.

use async_trait::async_trait;
use ragachat_core::{Embedder, EmbeddingError, EmbeddingVector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_EMBED_URL: &str = "https://api.cohere.com/v1/embed";

pub struct CohereEmbedder {
    url: String,
    model: String,
    input_type: String,
    api_key: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl CohereEmbedder {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Network(format!("HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            model: model.into(),
            input_type: "search_document".into(),
            api_key: api_key.into(),
            dimensions: ragachat_core::knowledge::DEFAULT_DIMENSIONS,
            client,
        })
    }

    pub fn with_input_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = input_type.into();
        self
    }

    /// Expected length of every returned vector.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn request_body<'a>(&'a self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            texts: vec![text],
            model: &self.model,
            input_type: &self.input_type,
        }
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    fn name(&self) -> &str {
        "cohere"
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        debug!(model = %self.model, input_type = %self.input_type, "Sending embedding request");

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Embedding service returned error");
            return Err(EmbeddingError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;

        parse_first_embedding(body, self.dimensions)
    }
}

fn parse_first_embedding(
    body: EmbedResponse,
    dimensions: usize,
) -> Result<EmbeddingVector, EmbeddingError> {
    let values = body
        .embeddings
        .into_iter()
        .next()
        .ok_or_else(|| EmbeddingError::Malformed("no embeddings in response".into()))?;
    EmbeddingVector::with_dimensions(values, dimensions)
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    texts: Vec<&'a str>,
    model: &'a str,
    input_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}
