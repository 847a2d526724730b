use redb::{ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// File name of the redb database inside the store directory.
pub const STORE_FILE: &str = "store.redb";

const META: TableDefinition<&str, &str> = TableDefinition::new("store_meta");
/// content hash -> (filename, chunk count)
const DOCUMENTS: TableDefinition<&str, (&str, u64)> = TableDefinition::new("documents");
/// point id -> chunk text
const CHUNKS: TableDefinition<u64, &str> = TableDefinition::new("chunks");
/// point id -> embedding as raw f32s
const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Storage error: {0}")]
    Storage(#[from] redb::Error),
    #[error("Database connection error: {0}")]
    Connection(String),
    #[error("Storage task failed: {0}")]
    Task(String),
    #[error("Store was built with embedding model {stored}, but {configured} is configured")]
    ModelMismatch { stored: String, configured: String },
}

/// A persisted chunk with its vector. Ids grow with insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub id: u64,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub content_hash: String,
    pub filename: String,
    pub chunk_count: usize,
}

/// Async wrapper over the embedded redb file that backs the vector store.
///
/// Every call runs on the blocking pool; writes are serialized by redb.
#[derive(Clone)]
pub struct Database {
    db: Arc<redb::Database>,
}

fn task_failed(err: tokio::task::JoinError) -> DatabaseError {
    DatabaseError::Task(err.to_string())
}

impl Database {
    /// Opens (creating if needed) the database under `dir` and pins it to
    /// `embedding_model`.
    pub async fn open(dir: &Path, embedding_model: &str) -> Result<Self, DatabaseError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| DatabaseError::Connection(format!("{}: {}", dir.display(), e)))?;

        let path = dir.join(STORE_FILE);
        let model = embedding_model.to_string();
        let (db, stored) = tokio::task::spawn_blocking(move || -> Result<_, redb::Error> {
            let db = redb::Database::create(&path)?;
            let stored = initialize(&db, &model)?;
            Ok((db, stored))
        })
        .await
        .map_err(task_failed)??;

        log::info!("Vector store schema ready");
        match stored {
            Some(stored) if stored != embedding_model => Err(DatabaseError::ModelMismatch {
                stored,
                configured: embedding_model.to_string(),
            }),
            _ => Ok(Self { db: Arc::new(db) }),
        }
    }

    async fn call<T, F>(&self, function: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&redb::Database) -> Result<T, redb::Error> + Send + 'static,
    {
        let db = self.db.clone();
        let result = tokio::task::spawn_blocking(move || function(&db))
            .await
            .map_err(task_failed)?;
        Ok(result?)
    }

    /// Inserts all entries, plus the document record when given, in one
    /// transaction. Returns the stored entries with their ids, or `None`
    /// without writing anything if a document with the same hash is present.
    pub async fn insert_entries(
        &self,
        document: Option<DocumentRecord>,
        entries: Vec<(String, Vec<f32>)>,
    ) -> Result<Option<Vec<StoredEntry>>, DatabaseError> {
        self.call(move |db| {
            let txn = db.begin_write()?;
            let stored = {
                if let Some(doc) = &document {
                    let mut documents = txn.open_table(DOCUMENTS)?;
                    if documents.get(doc.content_hash.as_str())?.is_some() {
                        return Ok(None);
                    }
                    let chunk_count = doc.chunk_count as u64;
                    documents.insert(doc.content_hash.as_str(), (doc.filename.as_str(), chunk_count))?;
                }

                let mut chunks = txn.open_table(CHUNKS)?;
                let mut vectors = txn.open_table(VECTORS)?;
                let mut next_id = match chunks.last()? {
                    Some((id, _)) => id.value() + 1,
                    None => 0,
                };

                let mut stored = Vec::with_capacity(entries.len());
                for (text, embedding) in entries {
                    chunks.insert(next_id, text.as_str())?;
                    vectors.insert(next_id, bytemuck::cast_slice::<f32, u8>(&embedding))?;
                    stored.push(StoredEntry { id: next_id, text, embedding });
                    next_id += 1;
                }
                stored
            };
            txn.commit()?;
            Ok(Some(stored))
        })
        .await
    }

    /// Every entry, ordered by id.
    pub async fn load_entries(&self) -> Result<Vec<StoredEntry>, DatabaseError> {
        self.call(|db| {
            let txn = db.begin_read()?;
            let chunks = txn.open_table(CHUNKS)?;
            let vectors = txn.open_table(VECTORS)?;

            let mut entries = Vec::new();
            for row in chunks.iter()? {
                let (id, text) = row?;
                let id = id.value();
                let Some(vector) = vectors.get(id)? else {
                    log::warn!("Chunk {} has no stored vector, skipping", id);
                    continue;
                };
                entries.push(StoredEntry {
                    id,
                    text: text.value().to_string(),
                    embedding: bytemuck::allocation::pod_collect_to_vec::<u8, f32>(vector.value()),
                });
            }
            Ok(entries)
        })
        .await
    }

    pub async fn find_document(&self, content_hash: &str) -> Result<Option<DocumentRecord>, DatabaseError> {
        let hash = content_hash.to_string();
        self.call(move |db| {
            let txn = db.begin_read()?;
            let documents = txn.open_table(DOCUMENTS)?;
            let record = documents.get(hash.as_str())?.map(|row| {
                let (filename, chunk_count) = row.value();
                DocumentRecord {
                    content_hash: hash.clone(),
                    filename: filename.to_string(),
                    chunk_count: chunk_count as usize,
                }
            });
            Ok(record)
        })
        .await
    }

    pub async fn count_entries(&self) -> Result<usize, DatabaseError> {
        self.call(|db| {
            let txn = db.begin_read()?;
            let count = txn.open_table(CHUNKS)?.len()?;
            Ok(count as usize)
        })
        .await
    }

    pub async fn count_documents(&self) -> Result<usize, DatabaseError> {
        self.call(|db| {
            let txn = db.begin_read()?;
            let count = txn.open_table(DOCUMENTS)?.len()?;
            Ok(count as usize)
        })
        .await
    }

    /// Deletes every entry and document record; returns the number of entries removed.
    pub async fn clear(&self) -> Result<usize, DatabaseError> {
        self.call(|db| {
            let txn = db.begin_write()?;
            let removed = txn.open_table(CHUNKS)?.len()?;
            txn.delete_table(CHUNKS)?;
            txn.delete_table(VECTORS)?;
            txn.delete_table(DOCUMENTS)?;
            create_tables(&txn)?;
            txn.commit()?;
            Ok(removed as usize)
        })
        .await
    }
}

fn create_tables(txn: &redb::WriteTransaction) -> Result<(), redb::Error> {
    txn.open_table(DOCUMENTS)?;
    txn.open_table(CHUNKS)?;
    txn.open_table(VECTORS)?;
    Ok(())
}

/// Creates missing tables and records `model` on first use. Returns the model
/// recorded by an earlier open, if any.
fn initialize(db: &redb::Database, model: &str) -> Result<Option<String>, redb::Error> {
    let txn = db.begin_write()?;
    create_tables(&txn)?;
    let stored = {
        let mut meta = txn.open_table(META)?;
        let stored = meta.get("embedding_model")?.map(|v| v.value().to_string());
        if stored.is_none() {
            meta.insert("embedding_model", model)?;
        }
        stored
    };
    txn.commit()?;
    Ok(stored)
}
