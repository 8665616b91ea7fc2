//! # ragachat Core
//!
//! Domain types, traits, and error definitions for the ragachat
//! retrieval-augmented chat orchestrator. This crate has **zero framework
//! dependencies**: it defines the domain model every other crate
//! implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (embedding service, generation endpoint,
//! persistence store) is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Testing the orchestration pipeline with scripted collaborators
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod knowledge;
pub mod provider;
pub mod session;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{EmbeddingError, Error, GenerationError, Result, StoreError};
pub use knowledge::{EmbeddingVector, KnowledgeDocument, NewKnowledgeDocument, ScoredDocument};
pub use provider::{Embedder, GenerationBackend, RecordReceiver};
pub use session::{ChatMessage, MessageId, MessagePage, NewMessage, Session, SessionId};
pub use store::{ChatStore, KnowledgeStore};
