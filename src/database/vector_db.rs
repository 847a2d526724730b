use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::database::database::{Database, DatabaseError, DocumentRecord, STORE_FILE};
use crate::database::index::HnswIndex;
use crate::providers::traits::{EmbeddingProvider, ProviderError};

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Vector store is not initialized")]
    Uninitialized,
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Embedding provider error: {0}")]
    Embedding(#[from] ProviderError),
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// The durable database and the search graph built from it.
struct StoreState {
    db: Database,
    index: HnswIndex,
}

impl StoreState {
    async fn open(dir: &Path, embedding_model: &str) -> Result<Self, VectorStoreError> {
        let db = Database::open(dir, embedding_model).await?;
        let entries = db.load_entries().await?;
        log::info!("Loaded {} entries into the search index", entries.len());
        Ok(Self {
            db,
            index: HnswIndex::new(entries),
        })
    }

    fn check_dimension(&self, actual: usize) -> Result<(), VectorStoreError> {
        match self.index.dimension() {
            Some(expected) if expected != actual => {
                Err(VectorStoreError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

/// Durable store of (chunk text, embedding) pairs.
///
/// The embedding provider given at construction is the only one ever used,
/// for both `add` and `query`. Reads and appends share the lock; `reset` and
/// `wipe` take it exclusively, so a query sees either the whole store or
/// none of it.
pub struct VectorStore {
    dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    state: RwLock<Option<StoreState>>,
}

impl VectorStore {
    pub async fn open(
        dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, VectorStoreError> {
        let dir = dir.into();
        let state = StoreState::open(&dir, embedder.model_id()).await?;
        log::info!("Vector store opened at {}", dir.display());

        Ok(Self {
            dir,
            embedder,
            state: RwLock::new(Some(state)),
        })
    }

    /// Embeds and persists `texts`. Not idempotent: the same text added twice
    /// is stored twice. Nothing is written if embedding fails.
    pub async fn add(&self, texts: &[String]) -> Result<usize, VectorStoreError> {
        if texts.is_empty() {
            return Ok(0);
        }
        let entries = self.embed_all(texts).await?;

        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(VectorStoreError::Uninitialized)?;
        state.check_dimension(entries[0].1.len())?;

        let stored = state.db.insert_entries(None, entries).await?.unwrap_or_default();
        let inserted = stored.len();
        state.index.extend(stored);
        log::info!("Added {} entries to vector store", inserted);
        Ok(inserted)
    }

    /// Like [`add`](Self::add), but records the document's content hash in the
    /// same transaction. Returns `None` when that hash is already indexed.
    pub async fn add_document(
        &self,
        content_hash: &str,
        filename: &str,
        texts: &[String],
    ) -> Result<Option<usize>, VectorStoreError> {
        let entries = self.embed_all(texts).await?;
        let record = DocumentRecord {
            content_hash: content_hash.to_string(),
            filename: filename.to_string(),
            chunk_count: texts.len(),
        };

        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(VectorStoreError::Uninitialized)?;
        if let Some((_, first)) = entries.first() {
            state.check_dimension(first.len())?;
        }

        match state.db.insert_entries(Some(record), entries).await? {
            Some(stored) => {
                let inserted = stored.len();
                state.index.extend(stored);
                Ok(Some(inserted))
            }
            None => Ok(None),
        }
    }

    pub async fn find_document(&self, content_hash: &str) -> Result<Option<DocumentRecord>, VectorStoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(VectorStoreError::Uninitialized)?;
        Ok(state.db.find_document(content_hash).await?)
    }

    /// The `k` stored texts closest to `question` by cosine distance.
    /// Equal distances keep insertion order.
    pub async fn query(&self, question: &str, k: usize) -> Result<Vec<String>, VectorStoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(VectorStoreError::Uninitialized)?;
        if state.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = self.embedder.embed(question).await?;
        state.check_dimension(query.len())?;
        Ok(state.index.search(&query, k))
    }

    pub async fn count(&self) -> Result<usize, VectorStoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(VectorStoreError::Uninitialized)?;
        Ok(state.db.count_entries().await?)
    }

    pub async fn document_count(&self) -> Result<usize, VectorStoreError> {
        let guard = self.state.read().await;
        let state = guard.as_ref().ok_or(VectorStoreError::Uninitialized)?;
        Ok(state.db.count_documents().await?)
    }

    /// Deletes every entry. Returns how many were removed; a no-op on an empty store.
    pub async fn reset(&self) -> Result<usize, VectorStoreError> {
        let guard = self.state.write().await;
        let state = guard.as_ref().ok_or(VectorStoreError::Uninitialized)?;
        let removed = state.db.clear().await?;
        state.index.clear();
        log::info!("Vector store reset, {} entries removed", removed);
        Ok(removed)
    }

    /// Deletes the storage directory and recreates it empty. Returns how many
    /// entries were dropped.
    ///
    /// If the directory cannot be removed the current store stays in use. If
    /// it was removed but cannot be recreated, the store reports itself
    /// uninitialized until a later wipe succeeds.
    pub async fn wipe(&self) -> Result<usize, VectorStoreError> {
        let mut guard = self.state.write().await;
        let removed = match guard.as_ref() {
            Some(state) => state.db.count_entries().await?,
            None => 0,
        };

        if tokio::fs::try_exists(&self.dir).await? {
            log::warn!("Deleting vector store at {}", self.dir.display());
            if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
                let intact = tokio::fs::try_exists(self.dir.join(STORE_FILE))
                    .await
                    .unwrap_or(true);
                if intact {
                    log::error!("Could not delete vector store, keeping it: {}", e);
                    return Err(e.into());
                }
                log::warn!("Vector store file removed, but cleanup failed: {}", e);
            }
        }

        match StoreState::open(&self.dir, self.embedder.model_id()).await {
            Ok(fresh) => {
                *guard = Some(fresh);
                log::info!("Vector store recreated, {} entries dropped", removed);
                Ok(removed)
            }
            Err(e) => {
                log::error!("Could not recreate vector store at {}: {}", self.dir.display(), e);
                *guard = None;
                Err(e)
            }
        }
    }

    async fn embed_all(&self, texts: &[String]) -> Result<Vec<(String, Vec<f32>)>, VectorStoreError> {
        let vectors = self.embedder.embed_batch(texts).await?;
        if vectors.len() != texts.len() {
            return Err(VectorStoreError::Embedding(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))));
        }
        if let Some(first) = vectors.first() {
            if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: first.len(),
                    actual: bad.len(),
                });
            }
        }
        Ok(texts.iter().cloned().zip(vectors).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    fn letter_vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 26];
        for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
        v
    }

    /// Bag-of-letters vectors: texts sharing letters land close together.
    struct LetterEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl LetterEmbedder {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0), fail: false }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ProviderError::InvalidResponse("offline".to_string()));
            }
            Ok(letter_vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            if self.fail {
                return Err(ProviderError::InvalidResponse("offline".to_string()));
            }
            Ok(texts.iter().map(|t| letter_vector(t)).collect())
        }

        fn model_id(&self) -> &str {
            "letters"
        }
    }

    /// Same vectors as `LetterEmbedder`, but signals when a call starts and
    /// then takes `delay` to answer.
    struct SlowEmbedder {
        started: Notify,
        delay: Duration,
    }

    impl SlowEmbedder {
        fn new(delay: Duration) -> Self {
            Self { started: Notify::new(), delay }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            self.started.notify_one();
            tokio::time::sleep(self.delay).await;
            Ok(letter_vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.started.notify_one();
            tokio::time::sleep(self.delay).await;
            Ok(texts.iter().map(|t| letter_vector(t)).collect())
        }

        fn model_id(&self) -> &str {
            "letters"
        }
    }

    async fn store(dir: &TempDir) -> VectorStore {
        VectorStore::open(dir.path().join("store"), Arc::new(LetterEmbedder::new()))
            .await
            .unwrap()
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_query_returns_nearest_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store
            .add(&texts(&["zzzz", "The capital of France is Paris.", "qqqq xxxx"]))
            .await
            .unwrap();

        let results = store.query("What is the capital of France?", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], "The capital of France is Paris.");
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.add(&texts(&["abc first", "abc first"])).await.unwrap();
        store.add(&texts(&["cab first"])).await.unwrap();

        // Identical vectors for all three; order must follow insertion.
        let results = store.query("abc first", 3).await.unwrap();
        assert_eq!(results, texts(&["abc first", "abc first", "cab first"]));

        let first_only = store.query("abc first", 1).await.unwrap();
        assert_eq!(first_only, texts(&["abc first"]));
    }

    #[tokio::test]
    async fn test_empty_store_query_skips_embedding() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(LetterEmbedder::new());
        let store = VectorStore::open(dir.path(), embedder.clone()).await.unwrap();

        assert!(store.query("anything", 3).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_is_not_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.add(&texts(&["same"])).await.unwrap();
        store.add(&texts(&["same"])).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.query("same", 5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_embedding_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(LetterEmbedder { calls: AtomicUsize::new(0), fail: true });
        let store = VectorStore::open(dir.path(), embedder).await.unwrap();

        let err = store.add(&texts(&["a", "b"])).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Embedding(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.add(&texts(&["one", "two"])).await.unwrap();

        assert_eq!(store.reset().await.unwrap(), 2);
        assert_eq!(store.reset().await.unwrap(), 0);
        assert!(store.query("one", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = store(&dir).await;
            store.add(&texts(&["durable", "other words"])).await.unwrap();
        }
        let reopened = store(&dir).await;
        assert_eq!(reopened.count().await.unwrap(), 2);
        assert_eq!(reopened.query("durable", 1).await.unwrap(), texts(&["durable"]));
    }

    #[tokio::test]
    async fn test_wipe_recreates_empty_directory() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.add(&texts(&["gone soon"])).await.unwrap();

        assert_eq!(store.wipe().await.unwrap(), 1);
        assert!(dir.path().join("store").join(STORE_FILE).exists());
        assert_eq!(store.wipe().await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.query("gone soon", 3).await.unwrap().is_empty());

        store.add(&texts(&["fresh"])).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_wipe_keeps_store_usable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        let store = VectorStore::open(path.clone(), Arc::new(LetterEmbedder::new()))
            .await
            .unwrap();
        store.add(&texts(&["kept"])).await.unwrap();

        // A plain file where the directory was cannot be removed as a directory.
        std::fs::remove_dir_all(&path).unwrap();
        std::fs::write(&path, b"not a directory").unwrap();

        let err = store.wipe().await.unwrap_err();
        assert!(matches!(err, VectorStoreError::Io(_)));

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.query("kept", 3).await.unwrap(), texts(&["kept"]));
        assert_eq!(store.add(&texts(&["still writable"])).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wipe_waits_for_in_flight_query() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        {
            let store = VectorStore::open(path.clone(), Arc::new(LetterEmbedder::new()))
                .await
                .unwrap();
            store.add(&texts(&["alpha", "beta", "gamma"])).await.unwrap();
        }

        let embedder = Arc::new(SlowEmbedder::new(Duration::from_millis(100)));
        let store = Arc::new(VectorStore::open(path, embedder.clone()).await.unwrap());

        let query = tokio::spawn({
            let store = store.clone();
            async move { store.query("alpha", 3).await }
        });
        embedder.started.notified().await;

        let removed = store.wipe().await.unwrap();
        let results = query.await.unwrap().unwrap();

        assert_eq!(removed, 3);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], "alpha");
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wipe_never_splits_an_add() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(SlowEmbedder::new(Duration::from_millis(50)));
        let store = Arc::new(
            VectorStore::open(dir.path().join("store"), embedder.clone())
                .await
                .unwrap(),
        );

        let batch = texts(&["one", "two", "three", "four", "five"]);
        let add = tokio::spawn({
            let store = store.clone();
            async move { store.add(&batch).await }
        });
        embedder.started.notified().await;

        let removed = store.wipe().await.unwrap();
        let added = add.await.unwrap().unwrap();
        let remaining = store.count().await.unwrap();

        assert_eq!(added, 5);
        assert!(
            (removed == 0 && remaining == 5) || (removed == 5 && remaining == 0),
            "removed {} and kept {}",
            removed,
            remaining
        );
    }

    #[tokio::test]
    async fn test_dimension_change_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.add(&texts(&["letters"])).await.unwrap();

        struct Short;
        #[async_trait]
        impl EmbeddingProvider for Short {
            async fn embed(&self, _: &str) -> Result<Vec<f32>, ProviderError> {
                Ok(vec![1.0])
            }
            async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
                Ok(texts.iter().map(|_| vec![1.0]).collect())
            }
            fn model_id(&self) -> &str {
                "letters"
            }
        }
        drop(store);

        let short = VectorStore::open(dir.path().join("store"), Arc::new(Short)).await.unwrap();
        let err = short.add(&texts(&["x"])).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { expected: 26, actual: 1 }));
        assert_eq!(short.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_document_dedupes_by_hash() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;

        let first = store.add_document("h1", "a.pdf", &texts(&["x", "y"])).await.unwrap();
        let again = store.add_document("h1", "b.pdf", &texts(&["x", "y"])).await.unwrap();

        assert_eq!(first, Some(2));
        assert_eq!(again, None);
        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.document_count().await.unwrap(), 1);
        assert_eq!(store.find_document("h1").await.unwrap().unwrap().filename, "a.pdf");
        assert_eq!(store.query("x", 5).await.unwrap().len(), 2);
    }
}
