//! `ragachat ingest`: Load text documents into the knowledge base.
//!
//! Every `.txt` / `.md` file directly inside the directory becomes one
//! document titled by its file name. Titles already present are skipped, so
//! re-running is cheap.

use std::path::{Path, PathBuf};

use ragachat_chat::{ChatRuntime, IngestOutcome, KnowledgeIngestor};
use tracing::warn;

use super::load_config;

const EXTENSIONS: [&str; 2] = ["txt", "md"];

#[derive(Debug, Default, PartialEq)]
pub struct IngestSummary {
    pub inserted: usize,
    pub skipped: usize,
}

pub async fn run(dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let dir = dir
        .or_else(|| config.knowledge.source_dir.clone())
        .ok_or("No directory given and knowledge.source_dir is not configured")?;

    let runtime = ChatRuntime::from_config(&config).await?;

    println!("📚 Ingesting documents from {}", dir.display());
    let summary = ingest_dir(&runtime.ingestor, &dir).await?;
    println!(
        "✅ {} inserted, {} already present",
        summary.inserted, summary.skipped
    );

    Ok(())
}

/// Ingest the documents of `dir` in file-name order, stopping at the first failure.
pub async fn ingest_dir(
    ingestor: &KnowledgeIngestor,
    dir: &Path,
) -> Result<IngestSummary, Box<dyn std::error::Error>> {
    let mut summary = IngestSummary::default();

    for path in document_files(dir)? {
        let Some(title) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable document");
                continue;
            }
        };
        if content.trim().is_empty() {
            warn!(path = %path.display(), "Skipping empty document");
            continue;
        }

        match ingestor.ingest(&title, &content).await? {
            IngestOutcome::Inserted(_) => {
                println!("   + {title}");
                summary.inserted += 1;
            }
            IngestOutcome::Skipped { .. } => summary.skipped += 1,
        }
    }

    Ok(summary)
}

fn document_files(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Cannot read directory {}: {e}", dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_document = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_document {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragachat_core::{Embedder, EmbeddingError, EmbeddingVector, KnowledgeStore};
    use ragachat_store::InMemoryStore;
    use std::sync::Arc;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn name(&self) -> &str {
            "length"
        }

        async fn embed(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
            Ok(EmbeddingVector::new(vec![text.len() as f32, 1.0]))
        }
    }

    #[tokio::test]
    async fn ingests_text_and_markdown_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("java.txt"), "Java is a language.").unwrap();
        std::fs::write(dir.path().join("spring.MD"), "# Spring Boot").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(dir.path().join("blank.txt"), "  \n").unwrap();

        let store = Arc::new(InMemoryStore::new());
        let ingestor = KnowledgeIngestor::new(Arc::new(LengthEmbedder), store.clone());

        let first = ingest_dir(&ingestor, dir.path()).await.unwrap();
        assert_eq!(
            first,
            IngestSummary {
                inserted: 2,
                skipped: 0
            }
        );

        let second = ingest_dir(&ingestor, dir.path()).await.unwrap();
        assert_eq!(
            second,
            IngestSummary {
                inserted: 0,
                skipped: 2
            }
        );
        assert_eq!(store.count_documents().await.unwrap(), 2);
        assert!(store.exists_by_title("java.txt").await.unwrap());
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let ingestor = KnowledgeIngestor::new(
            Arc::new(LengthEmbedder),
            Arc::new(InMemoryStore::new()),
        );
        let err = ingest_dir(&ingestor, Path::new("/definitely/not/here"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Cannot read directory"));
    }
}
