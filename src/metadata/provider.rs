//! MetadataProvider trait definition.
//!
//! The MetadataProvider trait abstracts over where a schema snapshot comes
//! from. The core never owns the snapshot's lifecycle: it asks the provider
//! for a fresh one whenever it needs to (re-)embed the schema.

use std::path::PathBuf;

use async_trait::async_trait;

use super::types::{SchemaSnapshot, TableInfo};
use crate::gateway::ExecutionError;

/// Result type for metadata operations.
pub type MetadataResult<T> = Result<T, MetadataError>;

/// Errors that can occur while fetching a schema snapshot.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse schema: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("schema query failed: {0}")]
    Query(#[from] ExecutionError),

    #[error("unexpected schema query result: {0}")]
    UnexpectedResult(String),

    #[error("table '{0}' not found")]
    TableNotFound(String),
}

/// Source of schema snapshots.
///
/// # Example
///
/// ```ignore
/// use quarry::metadata::MetadataProvider;
///
/// async fn example(provider: &impl MetadataProvider) -> MetadataResult<()> {
///     let snapshot = provider.snapshot().await?;
///     for table in snapshot.tables() {
///         println!("{} ({} columns)", table.name, table.columns.len());
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch the current schema of every table.
    async fn snapshot(&self) -> MetadataResult<SchemaSnapshot>;

    /// Names of all tables.
    async fn table_names(&self) -> MetadataResult<Vec<String>> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.table_names().map(str::to_string).collect())
    }

    /// Schema of a single table.
    async fn table(&self, name: &str) -> MetadataResult<TableInfo> {
        let snapshot = self.snapshot().await?;
        snapshot
            .get(name)
            .cloned()
            .ok_or_else(|| MetadataError::TableNotFound(name.to_string()))
    }
}

/// Provider serving a fixed snapshot, either built in memory or read from a
/// JSON file on every call.
#[derive(Debug, Clone)]
pub enum StaticMetadataProvider {
    Snapshot(SchemaSnapshot),
    File(PathBuf),
}

impl StaticMetadataProvider {
    pub fn new(snapshot: SchemaSnapshot) -> Self {
        Self::Snapshot(snapshot)
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }
}

#[async_trait]
impl MetadataProvider for StaticMetadataProvider {
    async fn snapshot(&self) -> MetadataResult<SchemaSnapshot> {
        match self {
            Self::Snapshot(snapshot) => Ok(snapshot.clone()),
            Self::File(path) => SchemaSnapshot::from_file(path),
        }
    }
}
