//! Schema snapshot types.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::provider::{MetadataError, MetadataResult};

/// Maximum number of sample values kept per column.
pub const MAX_SAMPLE_VALUES: usize = 5;

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,

    /// Declared database type (e.g. `UInt64`, `Nullable(String)`).
    #[serde(rename = "type")]
    pub column_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Distinct sample values, at most [`MAX_SAMPLE_VALUES`].
    #[serde(default)]
    pub sample_values: Vec<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            description: None,
            sample_values: Vec::new(),
        }
    }

    /// Attach sample values, truncated to [`MAX_SAMPLE_VALUES`].
    pub fn with_samples<I, S>(mut self, samples: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sample_values = samples
            .into_iter()
            .take(MAX_SAMPLE_VALUES)
            .map(Into::into)
            .collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn has_samples(&self) -> bool {
        !self.sample_values.is_empty()
    }
}

/// A table and its columns, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,

    #[serde(default)]
    pub columns: Vec<ColumnInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            name: name.into(),
            columns,
            row_count: None,
            description: None,
        }
    }

    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = Some(row_count);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// All tables of a database, keyed by name in discovery order.
///
/// The order matters: schema elements are embedded and tie-broken in the
/// order tables appear here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaSnapshot {
    tables: IndexMap<String, TableInfo>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a table, replacing any previous table with the same name.
    pub fn insert(&mut self, table: TableInfo) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Parse a snapshot from JSON: an object of table name to table.
    pub fn from_json(json: &str) -> MetadataResult<Self> {
        serde_json::from_str(json).map_err(MetadataError::Parse)
    }

    /// Load a snapshot from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> MetadataResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }
}

impl FromIterator<TableInfo> for SchemaSnapshot {
    fn from_iter<I: IntoIterator<Item = TableInfo>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for table in iter {
            snapshot.insert(table);
        }
        snapshot
    }
}
