//! Schema metadata module.
//!
//! This module defines the schema snapshot the retrieval pipeline reads and
//! the providers that produce it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MetadataProvider                           │
//! │  snapshot() -> SchemaSnapshot { table -> TableInfo }            │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                                   │
//!          ▼                                   ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────────┐
//! │  StaticMetadataProvider  │   │   ClickHouseMetadataProvider     │
//! │  (in memory / JSON file) │   │   (system.columns via gateway)   │
//! └──────────────────────────┘   └──────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use quarry::metadata::{MetadataProvider, StaticMetadataProvider};
//!
//! let provider = StaticMetadataProvider::from_file("schema.json");
//! let snapshot = provider.snapshot().await?;
//! ```

mod clickhouse_provider;
mod provider;
mod types;

pub use clickhouse_provider::ClickHouseMetadataProvider;
pub use provider::{MetadataError, MetadataProvider, MetadataResult, StaticMetadataProvider};
pub use types::*;
