use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),
}

/// Turns text into vectors.
///
/// A single instance must serve both indexing and querying, otherwise chunk
/// and question vectors live in different spaces and retrieval silently
/// degrades.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Identifies the model and configuration producing the vectors.
    fn model_id(&self) -> &str;
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    fn model_id(&self) -> &str;
}
