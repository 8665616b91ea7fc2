//! Remote model clients for ragachat.
//!
//! Embedders implement `ragachat_core::Embedder`; generation backends
//! implement `ragachat_core::GenerationBackend` and are wrapped by
//! [`GenerationClient`], which adds retry, blank-chunk filtering and the
//! fallback answer. The router builds both from configuration.

pub mod cohere;
pub mod gemini;
pub mod generation;
pub mod openai_compat;
pub mod record;
pub mod retry;
pub mod router;
pub mod sse;

pub use cohere::CohereEmbedder;
pub use gemini::GeminiBackend;
pub use generation::{ChunkReceiver, GenerationClient};
pub use openai_compat::OpenAiCompatProvider;
pub use record::GenerationRecord;
pub use retry::{RetryPolicy, RetryPredicate};
pub use router::{build_backend, build_embedder, build_generation_client};
