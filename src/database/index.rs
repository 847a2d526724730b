use instant_distance::{Builder, HnswMap, Point, Search};
use parking_lot::RwLock;

use crate::database::database::StoredEntry;

#[derive(Clone, Debug)]
struct EmbeddingPoint(Vec<f32>);

impl Point for EmbeddingPoint {
    fn distance(&self, other: &Self) -> f32 {
        cosine_distance(&self.0, &other.0)
    }
}

/// `1 - cos(a, b)`; zero vectors are maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

struct IndexState {
    entries: Vec<StoredEntry>,
    /// Graph over `entries`; values are positions in `entries`.
    hnsw: Option<HnswMap<EmbeddingPoint, usize>>,
    dirty: bool,
}

impl IndexState {
    fn rebuild(&mut self) {
        self.dirty = false;
        if self.entries.is_empty() {
            self.hnsw = None;
            return;
        }

        let points = self
            .entries
            .iter()
            .map(|e| EmbeddingPoint(e.embedding.clone()))
            .collect();
        let positions = (0..self.entries.len()).collect();
        self.hnsw = Some(Builder::default().build(points, positions));
        log::debug!("Rebuilt HNSW graph over {} entries", self.entries.len());
    }
}

/// In-memory HNSW graph over the persisted chunks.
///
/// Writes only append to the entry list; the graph is rebuilt on the next
/// search after a write.
pub struct HnswIndex {
    state: RwLock<IndexState>,
}

impl HnswIndex {
    pub fn new(entries: Vec<StoredEntry>) -> Self {
        Self {
            state: RwLock::new(IndexState {
                dirty: !entries.is_empty(),
                entries,
                hnsw: None,
            }),
        }
    }

    /// Vector length of the indexed entries, `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.state.read().entries.first().map(|e| e.embedding.len())
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn extend(&self, entries: Vec<StoredEntry>) {
        if entries.is_empty() {
            return;
        }
        let mut state = self.state.write();
        state.entries.extend(entries);
        state.dirty = true;
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.hnsw = None;
        state.dirty = false;
    }

    /// Texts of the `k` nearest entries. Equal distances are ordered by id,
    /// so earlier insertions win ties.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<String> {
        let mut state = self.state.write();
        if state.entries.is_empty() || k == 0 {
            return Vec::new();
        }
        if state.dirty || state.hnsw.is_none() {
            state.rebuild();
        }
        let Some(hnsw) = state.hnsw.as_ref() else {
            return Vec::new();
        };

        let point = EmbeddingPoint(query.to_vec());
        let mut search = Search::default();
        let mut hits: Vec<(f32, u64, usize)> = Vec::new();
        for item in hnsw.search(&point, &mut search) {
            // Keep collecting past k while distances tie with the k-th hit.
            if hits.len() >= k && hits.last().map_or(false, |last| item.distance > last.0) {
                break;
            }
            let position = *item.value;
            hits.push((item.distance, state.entries[position].id, position));
        }

        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.into_iter()
            .take(k)
            .map(|(_, _, position)| state.entries[position].text.clone())
            .collect()
    }
}
