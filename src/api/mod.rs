use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use validator::{Validate, ValidationError};

use crate::config::AppConfig;
use crate::database::VectorStore;
use crate::document::{DocumentProcessor, TextChunker};
use crate::error::PipelineError;
use crate::llm::AnswerGenerator;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider};
use crate::providers::GeminiProvider;

/// Everything a request handler needs, built once at start-up.
#[derive(Clone)]
pub struct AppState {
    store: Arc<VectorStore>,
    processor: DocumentProcessor,
    generator: AnswerGenerator,
    upload_dir: Arc<PathBuf>,
    retrieval_k: usize,
    max_upload_bytes: usize,
    max_concurrent_requests: usize,
}

impl AppState {
    /// Opens the store and wires the pipeline around the given providers.
    /// Fails if the store cannot be opened.
    pub async fn new(
        config: &AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn CompletionProvider>,
    ) -> anyhow::Result<Self> {
        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
        let store = Arc::new(VectorStore::open(&config.vector_store_dir, embedder).await?);

        Ok(Self {
            processor: DocumentProcessor::new(store.clone(), chunker),
            store,
            generator: AnswerGenerator::new(chat),
            upload_dir: Arc::new(config.upload_dir.clone()),
            retrieval_k: config.retrieval_k,
            max_upload_bytes: config.max_upload_bytes,
            max_concurrent_requests: config.max_concurrent_requests,
        })
    }

    /// State backed by the Gemini API for both embeddings and answers.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let embedder = Arc::new(GeminiProvider::embeddings(&config.provider)?);
        let chat = Arc::new(GeminiProvider::chat(&config.provider)?);
        Self::new(config, embedder, chat).await
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }
}

#[derive(Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 8000), custom = "not_blank")]
    question: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    answer: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    message: String,
    filename: String,
    characters: usize,
    chunks: usize,
    already_indexed: bool,
}

#[derive(Serialize)]
pub struct ResetResponse {
    message: String,
    removed: usize,
}

#[derive(Serialize)]
pub struct StatusResponse {
    chunks: usize,
    documents: usize,
}

#[derive(Serialize)]
struct ApiResponse {
    message: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// A failed request, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    error: PipelineError,
    context: Option<&'static str>,
}

impl ApiError {
    fn context(context: &'static str) -> impl FnOnce(PipelineError) -> Self {
        move |error| Self { error, context: Some(context) }
    }
}

impl<E: Into<PipelineError>> From<E> for ApiError {
    fn from(error: E) -> Self {
        Self { error: error.into(), context: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let detail = match self.context {
            Some(context) => format!("{}: {}", context, self.error),
            None => self.error.to_string(),
        };

        if status.is_server_error() {
            log::error!("{}", detail);
        } else {
            log::warn!("Rejected request: {}", detail);
        }
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Create and configure the API router
pub fn create_api(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    let body_limit = state.max_upload_bytes;
    let concurrency = state.max_concurrent_requests;

    Router::new()
        .route("/", get(root_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/reset", post(reset_handler))
        .route("/api/status", get(status_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(ConcurrencyLimitLayer::new(concurrency))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn root_handler() -> Json<ApiResponse> {
    Json(ApiResponse { message: "API is running.".to_string() })
}

async fn upload_handler(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<UploadResponse> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::InvalidRequest(e.body_text()))?
    {
        if field.name() == Some("file") {
            return handle_upload(&state, field).await;
        }
    }
    Err(PipelineError::InvalidRequest("No file provided.".to_string()).into())
}

async fn handle_upload(state: &AppState, field: Field<'_>) -> ApiResult<UploadResponse> {
    if field.content_type() != Some("application/pdf") {
        return Err(PipelineError::FileType.into());
    }
    let filename = field
        .file_name()
        .and_then(safe_filename)
        .ok_or_else(|| PipelineError::InvalidRequest("No file provided.".to_string()))?;

    let bytes = field
        .bytes()
        .await
        .map_err(|e| PipelineError::InvalidRequest(e.body_text()))?;

    let path = state.upload_dir.join(&filename);
    log::info!("Saving uploaded file to: {}", path.display());
    save_upload(&state.upload_dir, &path, &bytes)
        .await
        .map_err(|e| ApiError::context("Error saving file")(e.into()))?;

    // The saved file stays on disk even if indexing fails.
    let report = state
        .processor
        .process(&path)
        .await
        .map_err(ApiError::context("File saved, but error during processing"))?;

    let message = if report.already_indexed {
        "File uploaded. Identical content was already indexed.".to_string()
    } else {
        "File uploaded and processed successfully.".to_string()
    };

    Ok(Json(UploadResponse {
        message,
        filename,
        characters: report.characters,
        chunks: report.chunks,
        already_indexed: report.already_indexed,
    }))
}

async fn save_upload(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, bytes).await
}

/// Final path component of a client-supplied name, if it is a usable file name.
fn safe_filename(name: &str) -> Option<String> {
    let name = Path::new(name.trim()).file_name()?.to_str()?;
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

async fn chat_handler(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> ApiResult<ChatResponse> {
    request
        .validate()
        .map_err(|e| PipelineError::InvalidRequest(format!("Invalid question: {}", e)))?;

    log::info!("Received question: {}", request.question);
    let answer = state
        .generator
        .ask(&state.store, &request.question, state.retrieval_k)
        .await
        .map_err(ApiError::context("Error processing question"))?;

    Ok(Json(ChatResponse { answer }))
}

async fn reset_handler(State(state): State<AppState>) -> ApiResult<ResetResponse> {
    log::warn!("Reset requested");
    let removed = state
        .store
        .wipe()
        .await
        .map_err(|e| ApiError::context("Error resetting vector store")(e.into()))?;

    let message = if removed > 0 {
        "Vector store has been successfully reset.".to_string()
    } else {
        "Vector store was already empty, nothing to delete.".to_string()
    };
    Ok(Json(ResetResponse { message, removed }))
}

async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    Ok(Json(StatusResponse {
        chunks: state.store.count().await?,
        documents: state.store.document_count().await?,
    }))
}
