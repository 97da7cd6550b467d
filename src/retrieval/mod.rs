//! Schema retrieval.
//!
//! Narrows a database schema down to the tables and columns relevant to a
//! question.
//!
//! ```text
//! MetadataProvider ──► SchemaEmbedder ──► EmbeddingIndex
//!                            │
//!   question ──► QueryProcessor ──► find_relevant_schema (top-K)
//!                            │
//!                            ▼
//!                    ContextAssembler ──► focused context string
//! ```
//!
//! The schema is embedded lazily on the first search, or eagerly through
//! [`SchemaEmbedder::embed_schema`].

mod context;
mod element;
mod embedder;
mod processor;

pub use context::{ContextAssembler, DEFAULT_MAX_COLUMNS_PER_TABLE};
pub use element::{column_description, elements_from_snapshot, table_description, SchemaElement};
pub use embedder::{EmbeddedElement, RelevanceMatch, SchemaEmbedder};
pub use processor::{QueryProcessor, RetrievalResult, DEFAULT_TOP_K};

use crate::embedding::EmbeddingError;
use crate::metadata::MetadataError;

/// Errors raised while embedding or searching the schema.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("failed to fetch schema: {0}")]
    Metadata(#[from] MetadataError),

    #[error("failed to embed schema: {0}")]
    Embedding(#[from] EmbeddingError),
}
