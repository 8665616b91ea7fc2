//! # ragachat Chat
//!
//! The retrieval-augmented chat pipeline: history assembly, knowledge
//! retrieval, prompt composition and the orchestrator that streams an
//! answer while persisting both sides of the exchange.

pub mod history;
pub mod knowledge;
pub mod orchestrator;
pub mod prompt;
pub mod runtime;
pub mod session_locks;

#[cfg(test)]
mod test_support;

pub use history::HistoryAssembler;
pub use knowledge::{IngestOutcome, KnowledgeIngestor, KnowledgeRetriever};
pub use orchestrator::{ChatEventStream, ChatOrchestrator};
pub use prompt::PromptComposer;
pub use runtime::{ChatRuntime, Stores};
pub use session_locks::SessionLocks;
