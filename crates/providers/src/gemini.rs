//! Gemini streaming generation backend.
//!
//! Calls `POST {base_url}/v1beta/models/{model}:streamGenerateContent?alt=sse`
//! with the prompt as a single user part. Each streamed record is reduced to
//! its first text fragment; the line parsing runs in a spawned task that
//! feeds a [`RecordReceiver`].

use async_trait::async_trait;
use futures::StreamExt;
use ragachat_core::{GenerationBackend, GenerationError, RecordReceiver};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::record::GenerationRecord;
use crate::sse::{self, LineBuffer};

/// Default public endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiBackend {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn open_stream(&self, prompt: &str) -> Result<RecordReceiver, GenerationError> {
        if self.api_key.is_empty() {
            return Err(GenerationError::NotConfigured(
                "Gemini API key is not set".into(),
            ));
        }

        let body = GenerateRequest::for_prompt(prompt);

        debug!(model = %self.model, prompt_len = prompt.len(), "Sending Gemini streaming request");

        let response = self
            .client
            .post(self.stream_url())
            .header("X-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(e.to_string())
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini returned error");
            return Err(GenerationError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GenerationError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                lines.push(&bytes);
                while let Some(line) = lines.next_line() {
                    match parse_line(&line) {
                        None => continue,
                        Some(item) => {
                            let failed = item.is_err();
                            if tx.send(item).await.is_err() || failed {
                                return;
                            }
                        }
                    }
                }
            }

            if let Some(rest) = lines.finish() {
                if let Some(item) = parse_line(&rest) {
                    let _ = tx.send(item).await;
                }
            }
        });

        Ok(rx)
    }
}

/// Turn one body line into a stream item.
///
/// Framing-only lines yield `None`. A record carrying an `error` object is a
/// failure of the attempt. Records that do not parse degrade to `""`.
fn parse_line(line: &str) -> Option<Result<String, GenerationError>> {
    let data = sse::payload(line)?;

    // Streamed JSON arrays wrap records in `[`, `,` and `]`.
    let data = data.trim_start_matches(['[', ',']).trim_end_matches([']', ',']).trim();
    if data.is_empty() {
        return None;
    }

    let record = GenerationRecord::parse(data);
    if let Some(err) = record.error {
        return Some(Err(GenerationError::ApiError {
            status_code: err.code.unwrap_or(500),
            message: err
                .message
                .or(err.status)
                .unwrap_or_else(|| "error record in stream".into()),
        }));
    }
    Some(Ok(record.text().to_string()))
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

impl GenerateRequest {
    fn for_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
        }
    }
}
