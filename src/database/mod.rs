pub mod database;
pub mod index;
pub mod vector_db;

pub use database::{Database, DatabaseError, DocumentRecord};
pub use index::{cosine_distance, HnswIndex};
pub use vector_db::{VectorStore, VectorStoreError};
