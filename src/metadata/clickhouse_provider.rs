//! ClickHouseMetadataProvider implementation.
//!
//! Introspects a live database through an [`ExecutionGateway`]: table list,
//! column names and types from `system.columns`, a handful of distinct sample
//! values per column, and a row count per table. Every statement is
//! parameterized, identifiers included.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::provider::{MetadataError, MetadataProvider, MetadataResult};
use super::types::{ColumnInfo, SchemaSnapshot, TableInfo, MAX_SAMPLE_VALUES};
use crate::gateway::{ExecutionGateway, Parameters};

const LIST_TABLES_SQL: &str = "SHOW TABLES";

const COLUMNS_SQL: &str = "SELECT name, type FROM system.columns \
     WHERE database = {database:String} AND table = {table:String} ORDER BY position";

const SAMPLES_SQL: &str =
    "SELECT DISTINCT {column:Identifier} FROM {table:Identifier} LIMIT {limit:UInt32}";

const ROW_COUNT_SQL: &str = "SELECT COUNT(*) FROM {table:Identifier}";

/// MetadataProvider that queries ClickHouse system tables.
pub struct ClickHouseMetadataProvider {
    gateway: Arc<dyn ExecutionGateway>,
    database: String,
}

impl ClickHouseMetadataProvider {
    /// Create a provider for `database`, querying through `gateway`.
    pub fn new(gateway: Arc<dyn ExecutionGateway>, database: impl Into<String>) -> Self {
        Self {
            gateway,
            database: database.into(),
        }
    }

    async fn list_tables(&self) -> MetadataResult<Vec<String>> {
        let result = self.gateway.execute(LIST_TABLES_SQL, &Parameters::new()).await?;
        result
            .rows
            .iter()
            .map(|row| {
                row.first()
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| MetadataError::UnexpectedResult("table name is not a string".into()))
            })
            .collect()
    }

    async fn get_table(&self, table: &str) -> MetadataResult<TableInfo> {
        let mut params = Parameters::new();
        params.insert("database".into(), self.database.clone().into());
        params.insert("table".into(), table.into());
        let result = self.gateway.execute(COLUMNS_SQL, &params).await?;
        if result.rows.is_empty() {
            return Err(MetadataError::TableNotFound(table.to_string()));
        }

        let mut columns = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let (Some(name), Some(column_type)) = (
                row.first().and_then(Value::as_str),
                row.get(1).and_then(Value::as_str),
            ) else {
                return Err(MetadataError::UnexpectedResult(format!(
                    "malformed column row for table '{}'",
                    table
                )));
            };
            let samples = self.sample_values(table, name).await;
            columns.push(ColumnInfo::new(name, column_type).with_samples(samples));
        }

        let mut info = TableInfo::new(table, columns);
        info.row_count = self.row_count(table).await;
        Ok(info)
    }

    /// Distinct sample values for a column; empty if the query fails.
    async fn sample_values(&self, table: &str, column: &str) -> Vec<String> {
        let mut params = Parameters::new();
        params.insert("column".into(), column.into());
        params.insert("table".into(), table.into());
        params.insert("limit".into(), (MAX_SAMPLE_VALUES as u64).into());

        match self.gateway.execute(SAMPLES_SQL, &params).await {
            Ok(result) => result
                .rows
                .iter()
                .filter_map(|row| row.first())
                .map(value_text)
                .collect(),
            Err(e) => {
                debug!(table, column, error = %e, "sample query failed");
                Vec::new()
            }
        }
    }

    async fn row_count(&self, table: &str) -> Option<u64> {
        let mut params = Parameters::new();
        params.insert("table".into(), table.into());

        let result = match self.gateway.execute(ROW_COUNT_SQL, &params).await {
            Ok(result) => result,
            Err(e) => {
                debug!(table, error = %e, "row count query failed");
                return None;
            }
        };
        // 64-bit integers arrive quoted in JSON output
        match result.rows.first().and_then(|row| row.first())? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// Text form of a sample value.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl MetadataProvider for ClickHouseMetadataProvider {
    async fn snapshot(&self) -> MetadataResult<SchemaSnapshot> {
        let names = self.list_tables().await?;

        let futures: Vec<_> = names.iter().map(|name| self.get_table(name)).collect();
        let results = futures::future::join_all(futures).await;

        let mut snapshot = SchemaSnapshot::new();
        for (name, result) in names.iter().zip(results) {
            match result {
                Ok(table) => snapshot.insert(table),
                Err(e) => warn!(table = %name, error = %e, "failed to get schema for table"),
            }
        }
        Ok(snapshot)
    }

    async fn table_names(&self) -> MetadataResult<Vec<String>> {
        self.list_tables().await
    }

    async fn table(&self, name: &str) -> MetadataResult<TableInfo> {
        self.get_table(name).await
    }
}
