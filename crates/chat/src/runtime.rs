//! Wiring: configuration in, a ready orchestrator and ingestor out.

use std::sync::Arc;

use ragachat_config::AppConfig;
use ragachat_core::{ChatStore, Embedder, Error, KnowledgeStore};
use ragachat_providers::{GenerationClient, build_embedder, build_generation_client};
use ragachat_store::InMemoryStore;
use tracing::info;

use crate::knowledge::{KnowledgeIngestor, KnowledgeRetriever};
use crate::orchestrator::ChatOrchestrator;
use crate::prompt::PromptComposer;

/// Both persistence seams, usually backed by one database.
#[derive(Clone)]
pub struct Stores {
    pub chat: Arc<dyn ChatStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
}

impl Stores {
    /// One store serving both roles.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ChatStore + KnowledgeStore + 'static,
    {
        Self {
            chat: store.clone(),
            knowledge: store,
        }
    }

    /// Open the backend named by `config.database.backend`.
    pub async fn open(config: &AppConfig) -> Result<Self, Error> {
        match config.database.backend.as_str() {
            "memory" => {
                info!("Using in-memory store; nothing will survive a restart");
                Ok(Self::shared(Arc::new(InMemoryStore::new())))
            }
            "sqlite" => open_sqlite(config).await,
            "postgres" => open_postgres(config).await,
            other => Err(Error::Config {
                message: format!("unknown database backend '{other}'"),
            }),
        }
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(config: &AppConfig) -> Result<Stores, Error> {
    let url = config.database_url();
    if !url.contains(":memory:") {
        let file = url.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
        let parent = std::path::Path::new(file)
            .parent()
            .filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            tokio::fs::create_dir_all(parent).await.map_err(|e| Error::Config {
                message: format!("cannot create database directory {}: {e}", parent.display()),
            })?;
        }
    }
    let store =
        ragachat_store::SqliteStore::connect(&url, config.database.max_connections).await?;
    Ok(Stores::shared(Arc::new(store)))
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(_config: &AppConfig) -> Result<Stores, Error> {
    Err(Error::Config {
        message: "built without SQLite support (enable the `sqlite` feature)".into(),
    })
}

#[cfg(feature = "postgres")]
async fn open_postgres(config: &AppConfig) -> Result<Stores, Error> {
    let url = config.database.url.as_deref().ok_or_else(|| Error::Config {
        message: "database.url is required for the postgres backend".into(),
    })?;
    let store =
        ragachat_store::PostgresStore::connect(url, config.database.max_connections).await?;
    Ok(Stores::shared(Arc::new(store)))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(_config: &AppConfig) -> Result<Stores, Error> {
    Err(Error::Config {
        message: "built without PostgreSQL support (enable the `postgres` feature)".into(),
    })
}

/// Everything a front end (HTTP or CLI) needs.
#[derive(Clone)]
pub struct ChatRuntime {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub ingestor: KnowledgeIngestor,
    pub stores: Stores,
}

impl ChatRuntime {
    /// Open the store and build the HTTP collaborators named by `config`.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let stores = Stores::open(config).await?;
        let embedder = build_embedder(config)?;
        let generation = build_generation_client(config)?;

        info!(
            database = %config.database.backend,
            embedding = %config.embedding.provider,
            generation = generation.backend_name(),
            "Chat runtime ready"
        );
        Ok(Self::assemble(config, stores, embedder, generation))
    }

    /// Build from explicit collaborators, applying the tuning knobs of `config`.
    pub fn assemble(
        config: &AppConfig,
        stores: Stores,
        embedder: Arc<dyn Embedder>,
        generation: GenerationClient,
    ) -> Self {
        let retriever = KnowledgeRetriever::new(embedder.clone(), stores.knowledge.clone())
            .with_top_n(config.retrieval.knowledge_top_n)
            .with_threshold(config.retrieval.similarity_threshold);

        let composer = match &config.chat.system_framing {
            Some(framing) => PromptComposer::with_framing(framing.clone()),
            None => PromptComposer::new(),
        };

        let orchestrator = ChatOrchestrator::new(stores.chat.clone(), retriever, generation)
            .with_history_limit(config.retrieval.history_limit)
            .with_composer(composer)
            .with_assistant_label(config.chat.assistant_label.clone())
            .with_session_serialization(config.chat.serialize_session_appends);

        Self {
            orchestrator: Arc::new(orchestrator),
            ingestor: KnowledgeIngestor::new(embedder, stores.knowledge.clone()),
            stores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{KeywordEmbedder, ScriptedBackend};

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.database.backend = "memory".into();
        config
    }

    #[tokio::test]
    async fn memory_backend_opens() {
        let stores = Stores::open(&memory_config()).await.unwrap();
        assert_eq!(stores.chat.name(), stores.knowledge.name());
    }

    #[tokio::test]
    async fn unknown_backend_is_a_config_error() {
        let mut config = memory_config();
        config.database.backend = "oracle".into();
        assert!(matches!(
            Stores::open(&config).await,
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn assembled_runtime_uses_configured_label() {
        let mut config = memory_config();
        config.chat.assistant_label = "Bot".into();
        let stores = Stores::open(&config).await.unwrap();
        let generation = GenerationClient::new(Arc::new(ScriptedBackend::answering(&["hi"])));

        let runtime =
            ChatRuntime::assemble(&config, stores, Arc::new(KeywordEmbedder::new()), generation);
        let session = runtime
            .orchestrator
            .create_session("u1", "t")
            .await
            .unwrap();
        let mut rx = runtime
            .orchestrator
            .add_message(session.id, "u1", "Hello")
            .await
            .unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.sender, "Bot");
        assert_eq!(chunk.content, "hi");
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn sqlite_backend_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.sqlite");
        let mut config = AppConfig::default();
        config.database.url = Some(path.to_string_lossy().into_owned());

        let stores = Stores::open(&config).await.unwrap();
        stores.chat.create_session("u1", "t").await.unwrap();
        assert!(path.exists());
    }
}
