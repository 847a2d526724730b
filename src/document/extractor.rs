use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse PDF: {0}")]
    Parse(String),
    #[error("PDF parser crashed: {0}")]
    Crashed(String),
    #[error("No extractable text found in document")]
    Empty,
}

/// Text of every page in page order, concatenated without separators.
///
/// Pages without a text layer contribute nothing. The returned string may be
/// empty; callers decide whether that is an error.
pub fn extract_text_from_bytes(bytes: &[u8]) -> Result<String, ExtractionError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractionError::Parse(e.to_string()))?;
    Ok(pages.concat())
}

/// Reads and extracts `path` on the blocking pool.
pub async fn extract_text(path: &Path) -> Result<String, ExtractionError> {
    log::info!("Extracting text from: {}", path.display());

    let bytes = tokio::fs::read(path).await.map_err(|source| ExtractionError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let text = tokio::task::spawn_blocking(move || extract_text_from_bytes(&bytes))
        .await
        .map_err(|e| ExtractionError::Crashed(e.to_string()))??;

    log::info!("Text extraction successful. Total characters: {}", text.chars().count());
    Ok(text)
}
