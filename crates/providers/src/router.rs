//! Provider selection: builds the embedder and generation client named in
//! the configuration.

use std::sync::Arc;
use std::time::Duration;

use ragachat_config::AppConfig;
use ragachat_core::{Embedder, Error, GenerationBackend};

use crate::cohere::CohereEmbedder;
use crate::gemini::GeminiBackend;
use crate::generation::GenerationClient;
use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::RetryPolicy;

/// Build the configured embedding client.
pub fn build_embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>, Error> {
    let embedding = &config.embedding;
    let api_key = embedding.api_key.clone().unwrap_or_default();
    let timeout = Duration::from_secs(embedding.request_timeout_secs);
    let dimensions = config.retrieval.dimensions;

    let embedder: Arc<dyn Embedder> = match embedding.provider.as_str() {
        "cohere" => Arc::new(
            CohereEmbedder::new(&embedding.url, &embedding.model, api_key, timeout)?
                .with_input_type(&embedding.input_type)
                .with_dimensions(dimensions),
        ),
        "openai" => Arc::new(
            OpenAiCompatProvider::new("openai", &embedding.url, api_key, &embedding.model, timeout)
                .map_err(|e| Error::Config {
                    message: format!("embedding HTTP client: {e}"),
                })?
                .with_dimensions(dimensions),
        ),
        other => {
            return Err(Error::Config {
                message: format!("unknown embedding provider '{other}'"),
            });
        }
    };

    Ok(embedder)
}

/// Build the configured generation backend without retry.
pub fn build_backend(config: &AppConfig) -> Result<Arc<dyn GenerationBackend>, Error> {
    let generation = &config.generation;
    let api_key = generation.api_key.clone().unwrap_or_default();
    let timeout = Duration::from_secs(generation.request_timeout_secs);

    let backend: Arc<dyn GenerationBackend> = match generation.provider.as_str() {
        "gemini" => Arc::new(GeminiBackend::new(
            &generation.base_url,
            &generation.model,
            api_key,
            timeout,
        )?),
        "openai" => Arc::new(
            OpenAiCompatProvider::new(
                "openai",
                &generation.base_url,
                api_key,
                &generation.model,
                timeout,
            )
            .map_err(|e| Error::Config {
                message: format!("generation HTTP client: {e}"),
            })?,
        ),
        other => {
            return Err(Error::Config {
                message: format!("unknown generation provider '{other}'"),
            });
        }
    };

    Ok(backend)
}

/// Build the generation client: configured backend, retry policy and fallback answer.
pub fn build_generation_client(config: &AppConfig) -> Result<GenerationClient, Error> {
    let backend = build_backend(config)?;
    Ok(GenerationClient::new(backend)
        .with_retry(RetryPolicy::from(&config.generation.retry))
        .with_fallback_message(&config.chat.fallback_message))
}
