use thiserror::Error;

use crate::database::VectorStoreError;
use crate::document::extractor::ExtractionError;
use crate::providers::traits::ProviderError;

/// Every way an upload, question or reset can fail.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid file type. Only PDFs are allowed.")]
    FileType,
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("Text chunking produced no chunks")]
    Chunking,
    #[error("Embedding provider error: {0}")]
    Embedding(ProviderError),
    #[error("Answer generation failed: {0}")]
    Generation(ProviderError),
    #[error("Vector store error: {0}")]
    Store(VectorStoreError),
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VectorStoreError> for PipelineError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::Embedding(e) => PipelineError::Embedding(e),
            other => PipelineError::Store(other),
        }
    }
}

impl PipelineError {
    /// Errors caused by the request itself rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::FileType | PipelineError::InvalidRequest(_))
    }
}
