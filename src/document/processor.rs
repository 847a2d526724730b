use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

use crate::database::VectorStore;
use crate::document::chunker::TextChunker;
use crate::document::extractor::{extract_text, ExtractionError};
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub filename: String,
    pub characters: usize,
    pub chunks: usize,
    /// True when identical text was indexed before and nothing was added.
    pub already_indexed: bool,
}

/// Runs extraction, chunking and indexing for one document.
///
/// Either every chunk of the document reaches the store or none does.
#[derive(Clone)]
pub struct DocumentProcessor {
    store: Arc<VectorStore>,
    chunker: TextChunker,
}

impl DocumentProcessor {
    pub fn new(store: Arc<VectorStore>, chunker: TextChunker) -> Self {
        Self { store, chunker }
    }

    pub async fn process(&self, path: &Path) -> Result<IngestReport, PipelineError> {
        log::info!("Starting ingestion pipeline for {}", path.display());
        let text = extract_text(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.process_text(&filename, &text).await
    }

    /// Indexes already-extracted text. Empty or whitespace-only text counts as
    /// a failed extraction.
    pub async fn process_text(&self, filename: &str, text: &str) -> Result<IngestReport, PipelineError> {
        if text.trim().is_empty() {
            log::warn!("Text extraction for {} produced nothing. Aborting pipeline.", filename);
            return Err(ExtractionError::Empty.into());
        }

        let characters = text.chars().count();
        let hash = content_hash(text);
        if let Some(existing) = self.store.find_document(&hash).await? {
            log::info!(
                "{} has the same content as already indexed {}, skipping",
                filename,
                existing.filename
            );
            return Ok(IngestReport {
                filename: filename.to_string(),
                characters,
                chunks: 0,
                already_indexed: true,
            });
        }

        let chunks = self.chunker.split(text);
        if chunks.is_empty() {
            log::warn!("Text chunking failed for {}. Aborting pipeline.", filename);
            return Err(PipelineError::Chunking);
        }
        log::info!("Text split into {} chunks.", chunks.len());

        let added = self.store.add_document(&hash, filename, &chunks).await?;
        let report = match added {
            Some(count) => IngestReport {
                filename: filename.to_string(),
                characters,
                chunks: count,
                already_indexed: false,
            },
            None => IngestReport {
                filename: filename.to_string(),
                characters,
                chunks: 0,
                already_indexed: true,
            },
        };

        log::info!("Successfully processed and indexed {} ({} chunks)", filename, report.chunks);
        Ok(report)
    }
}

/// Hex xxh3-64 of the extracted text, used to detect re-uploads.
pub fn content_hash(text: &str) -> String {
    format!("{:016x}", xxh3_64(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::sample::pdf_with_pages;
    use crate::providers::traits::{EmbeddingProvider, ProviderError};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn model_id(&self) -> &str {
            "length"
        }
    }

    async fn processor(dir: &TempDir) -> (DocumentProcessor, Arc<VectorStore>) {
        let store = Arc::new(
            VectorStore::open(dir.path().join("store"), Arc::new(LengthEmbedder))
                .await
                .unwrap(),
        );
        let chunker = TextChunker::new(100, 20).unwrap();
        (DocumentProcessor::new(store.clone(), chunker), store)
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("same"), content_hash("same"));
        assert_ne!(content_hash("same"), content_hash("different"));
        assert_eq!(content_hash("x").len(), 16);
    }

    #[tokio::test]
    async fn test_indexes_every_chunk() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = processor(&dir).await;
        let text = "Sentence number one is here. ".repeat(20);

        let report = processor.process_text("doc.pdf", &text).await.unwrap();
        assert!(report.chunks > 1);
        assert!(!report.already_indexed);
        assert_eq!(store.count().await.unwrap(), report.chunks);
    }

    #[tokio::test]
    async fn test_blank_text_is_an_extraction_failure() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = processor(&dir).await;

        let err = processor.process_text("scan.pdf", " \n\n ").await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(ExtractionError::Empty)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_same_content_is_indexed_once() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = processor(&dir).await;

        let first = processor.process_text("a.pdf", "The capital of France is Paris.").await.unwrap();
        let second = processor.process_text("b.pdf", "The capital of France is Paris.").await.unwrap();

        assert_eq!(first.chunks, 1);
        assert!(second.already_indexed);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_pdf_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = processor(&dir).await;
        let path = dir.path().join("broken.pdf");
        tokio::fs::write(&path, b"%PDF-1.4 truncated").await.unwrap();

        let err = processor.process(&path).await.unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_processes_pdf_from_disk() {
        let dir = TempDir::new().unwrap();
        let (processor, store) = processor(&dir).await;
        let path = dir.path().join("france.pdf");
        tokio::fs::write(&path, pdf_with_pages(&["The capital of France is Paris."]))
            .await
            .unwrap();

        let report = processor.process(&path).await.unwrap();
        assert_eq!(report.filename, "france.pdf");
        assert_eq!(report.chunks, 1);

        let results = store.query("capital", 3).await.unwrap();
        assert!(results[0].contains("Paris"));
    }
}
