//! Persistent storage for the embedding cache.
//!
//! The embedding index keeps two parallel mappings in memory, `text -> id`
//! and `id -> vector`. This module serializes them as one versioned
//! [`CacheSnapshot`] through an [`EmbeddingStore`] backend.
//!
//! # Design
//!
//! - Explicit saves only; nothing is written behind the caller's back
//! - No TTL or eviction - the cache persists until cleared
//! - Versioned - a snapshot with another version is treated as corrupt
//! - Loading never aborts startup: callers degrade to an empty cache
//!
//! # Backends
//!
//! ```text
//! SqliteStore     ~/.quarry/embeddings.db    meta(version) + cache(key -> blob)
//! JsonFileStore   ~/.quarry/embeddings.json  the snapshot as a JSON document
//! MemoryStore     in process                 tests and ephemeral runs
//! ```

mod file;
mod sqlite;

pub use file::JsonFileStore;
pub use sqlite::SqliteStore;

use std::sync::Mutex;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Current snapshot format version. Bump this when the layout changes.
pub const CACHE_VERSION: u32 = 1;

/// Errors that can occur while loading or saving the cache.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("Unsupported cache version {found} (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Corrupt cache: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Serialized form of the embedding cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,

    /// Name of the model that produced the vectors. Snapshots without one
    /// are accepted by any model of the same dimension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Source text to embedding id.
    pub text_to_id: IndexMap<String, String>,

    /// Embedding id to vector.
    pub embeddings: IndexMap<String, Vec<f32>>,
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self {
            version: CACHE_VERSION,
            model: None,
            text_to_id: IndexMap::new(),
            embeddings: IndexMap::new(),
        }
    }
}

impl CacheSnapshot {
    /// Parse and check a snapshot from its JSON form.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let snapshot: CacheSnapshot = serde_json::from_str(json)?;
        snapshot.check()?;
        Ok(snapshot)
    }

    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Verify version and internal consistency.
    ///
    /// Every text must map to a stored vector, and all vectors must have the
    /// same length.
    pub fn check(&self) -> StoreResult<()> {
        if self.version != CACHE_VERSION {
            return Err(StoreError::VersionMismatch {
                found: self.version,
                expected: CACHE_VERSION,
            });
        }

        for (text, id) in &self.text_to_id {
            if !self.embeddings.contains_key(id) {
                return Err(StoreError::Corrupt(format!(
                    "text {:?} maps to missing embedding '{}'",
                    text, id
                )));
            }
        }

        let mut lengths = self.embeddings.values().map(Vec::len);
        if let Some(first) = lengths.next() {
            if lengths.any(|len| len != first) {
                return Err(StoreError::Corrupt("embeddings have mixed dimensions".into()));
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.text_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text_to_id.is_empty()
    }
}

/// Durable storage for a [`CacheSnapshot`].
pub trait EmbeddingStore: Send + Sync {
    /// Load the stored snapshot, or `None` if nothing has been saved yet.
    fn load(&self) -> StoreResult<Option<CacheSnapshot>>;

    /// Replace the stored snapshot.
    fn save(&self, snapshot: &CacheSnapshot) -> StoreResult<()>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// Store that keeps the snapshot in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<CacheSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing snapshot, as if it had been saved earlier.
    pub fn with_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }
}

impl EmbeddingStore for MemoryStore {
    fn load(&self) -> StoreResult<Option<CacheSnapshot>> {
        let guard = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(snapshot) => {
                snapshot.check()?;
                Ok(Some(snapshot.clone()))
            }
            None => Ok(None),
        }
    }

    fn save(&self, snapshot: &CacheSnapshot) -> StoreResult<()> {
        let mut guard = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(snapshot.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
