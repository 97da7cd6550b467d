//! SQLite-backed embedding store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::{CacheSnapshot, EmbeddingStore, StoreError, StoreResult, CACHE_VERSION};

/// Key under which the snapshot blob is stored.
const SNAPSHOT_KEY: &str = "embeddings";

/// Embedding store kept in a SQLite database.
///
/// The database has a `meta` table recording the format version and a
/// `cache` key/value table holding the snapshot. Opening a database written
/// with another version clears the cache.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    location: String,
}

impl SqliteStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            location: path.display().to_string(),
        };
        store.init()?;
        Ok(store)
    }

    /// Open the store at the default location, `~/.quarry/embeddings.db`.
    pub fn open_default() -> StoreResult<Self> {
        Self::open(Self::default_path()?)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            location: ":memory:".to_string(),
        };
        store.init()?;
        Ok(store)
    }

    /// Default path of the store database.
    pub fn default_path() -> StoreResult<PathBuf> {
        let base = dirs::home_dir().ok_or(StoreError::NoCacheDir)?;
        Ok(base.join(".quarry").join("embeddings.db"))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Initialize the schema and check the stored version.
    fn init(&self) -> StoreResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<u32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == CACHE_VERSION => {}
            Some(_) => {
                conn.execute("DELETE FROM cache", [])?;
                Self::set_version(&conn)?;
            }
            None => Self::set_version(&conn)?,
        }

        Ok(())
    }

    fn set_version(conn: &Connection) -> StoreResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
            params![CACHE_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Remove the stored snapshot.
    pub fn clear(&self) -> StoreResult<()> {
        self.conn().execute("DELETE FROM cache", [])?;
        Ok(())
    }
}

impl EmbeddingStore for SqliteStore {
    fn load(&self) -> StoreResult<Option<CacheSnapshot>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM cache WHERE key = ?",
                params![SNAPSHOT_KEY],
                |row| row.get(0),
            )
            .optional()?;

        json.map(|s| CacheSnapshot::from_json(&s)).transpose()
    }

    fn save(&self, snapshot: &CacheSnapshot) -> StoreResult<()> {
        let json = snapshot.to_json()?;
        self.conn().execute(
            "INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)",
            params![SNAPSHOT_KEY, json],
        )?;
        Ok(())
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}
