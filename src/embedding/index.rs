//! Memoizing embedding index.

use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn};

use super::model::EmbeddingModel;
use super::similarity::rank;
use super::{EmbeddingError, EmbeddingResult};
use crate::cache::{CacheSnapshot, EmbeddingStore, MemoryStore, StoreResult, CACHE_VERSION};

/// One cached embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
}

/// Size of the in-memory table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub entries: usize,
    pub dimension: usize,
    pub model: String,
}

/// The `text <-> id <-> vector` table.
#[derive(Debug, Default)]
struct EmbeddingTable {
    text_to_id: IndexMap<String, String>,
    embeddings: IndexMap<String, Vec<f32>>,
}

impl EmbeddingTable {
    fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            text_to_id: snapshot.text_to_id,
            embeddings: snapshot.embeddings,
        }
    }

    fn to_snapshot(&self, model: &str) -> CacheSnapshot {
        CacheSnapshot {
            version: CACHE_VERSION,
            model: Some(model.to_string()),
            text_to_id: self.text_to_id.clone(),
            embeddings: self.embeddings.clone(),
        }
    }

    fn get(&self, text: &str) -> Option<&Vec<f32>> {
        self.text_to_id.get(text).and_then(|id| self.embeddings.get(id))
    }

    fn insert(&mut self, text: &str, vector: Vec<f32>) -> String {
        let mut n = self.embeddings.len();
        let mut id = format!("emb_{}", n);
        while self.embeddings.contains_key(&id) {
            n += 1;
            id = format!("emb_{}", n);
        }
        self.embeddings.insert(id.clone(), vector);
        self.text_to_id.insert(text.to_string(), id.clone());
        id
    }

    fn dimension(&self) -> Option<usize> {
        self.embeddings.values().next().map(Vec::len)
    }
}

/// Maps text to embedding vectors, calling the model at most once per
/// distinct text.
///
/// The table lives behind a single lock. The model is invoked while the lock
/// is held, so concurrent callers never embed the same text twice and a save
/// never interleaves with a write. The table grows without eviction.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use quarry::cache::SqliteStore;
/// use quarry::embedding::{EmbeddingIndex, HashingEmbedder};
///
/// let index = EmbeddingIndex::open(
///     Arc::new(HashingEmbedder::default()),
///     Arc::new(SqliteStore::open_default()?),
/// );
/// let ranked = index.find_similar("count orders", &descriptions, 10)?;
/// index.save()?;
/// ```
pub struct EmbeddingIndex {
    model: Arc<dyn EmbeddingModel>,
    store: Arc<dyn EmbeddingStore>,
    table: Mutex<EmbeddingTable>,
}

impl EmbeddingIndex {
    /// Create an index, reloading any snapshot held by `store`.
    ///
    /// A missing, unreadable, or incompatible snapshot leaves the index
    /// empty; it is logged and never fails construction.
    pub fn open(model: Arc<dyn EmbeddingModel>, store: Arc<dyn EmbeddingStore>) -> Self {
        let table = match store.load() {
            Ok(Some(snapshot)) => Self::accept(snapshot, model.as_ref(), store.as_ref()),
            Ok(None) => EmbeddingTable::default(),
            Err(e) => {
                warn!(location = %store.location(), error = %e, "failed to load embedding cache, starting empty");
                EmbeddingTable::default()
            }
        };

        Self {
            model,
            store,
            table: Mutex::new(table),
        }
    }

    /// Keep a loaded snapshot only if `model` could have produced it.
    fn accept(
        snapshot: CacheSnapshot,
        model: &dyn EmbeddingModel,
        store: &dyn EmbeddingStore,
    ) -> EmbeddingTable {
        if let Some(cached) = snapshot.model.as_deref() {
            if cached != model.name() {
                warn!(
                    location = %store.location(),
                    cached,
                    model = model.name(),
                    "embedding cache was built by another model, starting empty"
                );
                return EmbeddingTable::default();
            }
        }

        let table = EmbeddingTable::from_snapshot(snapshot);
        match table.dimension() {
            Some(dim) if dim != model.dimension() => {
                warn!(
                    location = %store.location(),
                    cached = dim,
                    model = model.dimension(),
                    "embedding cache has a different dimension, starting empty"
                );
                EmbeddingTable::default()
            }
            _ => {
                info!(
                    location = %store.location(),
                    entries = table.text_to_id.len(),
                    "loaded embedding cache"
                );
                table
            }
        }
    }

    /// Create an index that is never persisted beyond process memory.
    pub fn in_memory(model: Arc<dyn EmbeddingModel>) -> Self {
        Self::open(model, Arc::new(MemoryStore::new()))
    }

    fn table(&self) -> MutexGuard<'_, EmbeddingTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Embed a single text.
    pub fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let mut table = self.table();
        if let Some(vector) = table.get(text) {
            return Ok(vector.clone());
        }

        let vector = self.encode(&[text])?.remove(0);
        table.insert(text, vector.clone());
        Ok(vector)
    }

    /// Embed many texts, encoding only those not already cached.
    ///
    /// The model is called at most once, with each uncached text appearing
    /// once. Results are in input order.
    pub fn embed_batch<S: AsRef<str>>(&self, texts: &[S]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut table = self.table();

        let new_texts: IndexSet<&str> = texts
            .iter()
            .map(|t| t.as_ref())
            .filter(|text| table.get(text).is_none())
            .collect();

        if !new_texts.is_empty() {
            debug!(new = new_texts.len(), total = texts.len(), "embedding batch");
            let batch: Vec<&str> = new_texts.iter().copied().collect();
            let vectors = self.encode(&batch)?;
            for (text, vector) in batch.iter().zip(vectors) {
                table.insert(text, vector);
            }
        }

        texts
            .iter()
            .map(|text| {
                table
                    .get(text.as_ref())
                    .cloned()
                    .ok_or_else(|| EmbeddingError::Model(format!("no embedding for {:?}", text.as_ref())))
            })
            .collect()
    }

    /// Rank `candidates` by cosine similarity to `query`.
    ///
    /// Returns at most `min(k, candidates.len())` pairs, best first, with
    /// ties kept in candidate order.
    pub fn find_similar<S: AsRef<str>>(
        &self,
        query: &str,
        candidates: &[S],
        k: usize,
    ) -> EmbeddingResult<Vec<(String, f32)>> {
        let query_vector = self.embed(query)?;
        let candidate_vectors = self.embed_batch(candidates)?;

        Ok(rank(&query_vector, &candidate_vectors, k)
            .into_iter()
            .map(|(i, score)| (candidates[i].as_ref().to_string(), score))
            .collect())
    }

    /// Look up a cached embedding without computing anything.
    pub fn record(&self, text: &str) -> Option<EmbeddingRecord> {
        let table = self.table();
        let id = table.text_to_id.get(text)?;
        let vector = table.embeddings.get(id)?;
        Some(EmbeddingRecord {
            id: id.clone(),
            vector: vector.clone(),
            text: text.to_string(),
        })
    }

    pub fn contains(&self, text: &str) -> bool {
        self.table().get(text).is_some()
    }

    pub fn len(&self) -> usize {
        self.table().text_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entries: self.len(),
            dimension: self.model.dimension(),
            model: self.model.name().to_string(),
        }
    }

    /// Persist the current table through the store.
    pub fn save(&self) -> StoreResult<()> {
        let table = self.table();
        self.store.save(&table.to_snapshot(self.model.name()))?;
        info!(location = %self.store.location(), entries = table.text_to_id.len(), "saved embedding cache");
        Ok(())
    }

    /// Call the model and check its output shape.
    fn encode(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let vectors = self.model.encode(texts)?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                found: vectors.len(),
            });
        }
        let expected = self.model.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                found: bad.len(),
            });
        }
        Ok(vectors)
    }
}
