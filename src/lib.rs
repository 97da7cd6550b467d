//! # Quarry
//!
//! Natural-language questions to safe, parameterized ClickHouse SQL.
//!
//! ## Architecture
//!
//! Quarry narrows a large schema down to what a question is about, asks a
//! language model for a statement, and refuses anything that is not a plain
//! read before it reaches the database:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          MetadataProvider (schema snapshot)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [retrieval + embedding]
//! ┌─────────────────────────────────────────────────────────┐
//! │   SchemaEmbedder ─► EmbeddingIndex ─► top-K elements    │
//! │   ContextAssembler ─► focused schema context            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [llm]
//! ┌─────────────────────────────────────────────────────────┐
//! │          SqlGenerator (candidate SQL + parameters)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation]
//! ┌─────────────────────────────────────────────────────────┐
//! │          SqlValidator (verdict, short-circuiting)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [gateway]
//! ┌─────────────────────────────────────────────────────────┐
//! │          ExecutionGateway (ClickHouse HTTP)             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! [`pipeline::Pipeline`] wires the stages together.

pub mod cache;
pub mod config;
pub mod embedding;
pub mod gateway;
pub mod llm;
pub mod metadata;
pub mod pipeline;
pub mod retrieval;
pub mod validation;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::cache::{EmbeddingStore, JsonFileStore, MemoryStore, SqliteStore};
    pub use crate::config::Settings;
    pub use crate::embedding::{EmbeddingIndex, EmbeddingModel, HashingEmbedder, SentenceEncoder};
    pub use crate::gateway::{ClickHouseGateway, ExecutionGateway, Parameters, QueryResult};
    pub use crate::llm::{GeneratedSql, OpenAiGenerator, SqlGenerator};
    pub use crate::metadata::{
        ClickHouseMetadataProvider, ColumnInfo, MetadataProvider, SchemaSnapshot,
        StaticMetadataProvider, TableInfo,
    };
    pub use crate::pipeline::{ContextMode, Pipeline, PipelineError, QueryOutcome};
    pub use crate::retrieval::{ContextAssembler, QueryProcessor, SchemaEmbedder};
    pub use crate::validation::{SqlValidator, ValidationVerdict};
}
