pub mod api;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod llm;
pub mod providers;

// Re-export commonly used items
pub use config::AppConfig;
pub use database::VectorStore;
pub use document::DocumentProcessor;
pub use error::PipelineError;
