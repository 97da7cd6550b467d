//! Execution gateway module.
//!
//! The gateway is the only place SQL reaches the database. Callers hand it a
//! statement that has already passed [`crate::validation::SqlValidator`],
//! together with the named parameters produced by the generator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    ExecutionGateway (trait)                     │
//! │   execute(sql, parameters) -> QueryResult | ExecutionError      │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      ClickHouseGateway                          │
//! │   HTTP interface, `param_<name>` binding, JSONCompact output    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use quarry::gateway::{ClickHouseGateway, ExecutionGateway, Parameters};
//!
//! let gateway = ClickHouseGateway::new(&settings.clickhouse)?;
//! let mut params = Parameters::new();
//! params.insert("min_amount".into(), 100.0.into());
//!
//! let result = gateway
//!     .execute("SELECT COUNT(*) FROM orders WHERE amount > {min_amount:Float64}", &params)
//!     .await?;
//! ```

mod clickhouse;
mod error;

pub use clickhouse::ClickHouseGateway;
pub use error::{ExecutionError, ExecutionResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Named query parameters, bound by the database at execution time.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

/// Rows and column names returned by a successful statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Runs validated, parameterized statements.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Execute `sql`, binding `parameters` by name.
    async fn execute(&self, sql: &str, parameters: &Parameters) -> ExecutionResult<QueryResult>;
}
