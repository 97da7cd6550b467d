//! JSON file embedding store.

use std::fs;
use std::path::{Path, PathBuf};

use super::{CacheSnapshot, EmbeddingStore, StoreResult};

/// Embedding store kept as a single JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EmbeddingStore for JsonFileStore {
    fn load(&self) -> StoreResult<Option<CacheSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        CacheSnapshot::from_json(&content).map(Some)
    }

    /// Write the snapshot to a sibling temp file, then rename it over the
    /// previous one.
    fn save(&self, snapshot: &CacheSnapshot) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, snapshot.to_json()?)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
