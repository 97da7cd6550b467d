//! Question to focused schema context.

use std::sync::Arc;

use tracing::{debug, warn};

use super::context::ContextAssembler;
use super::embedder::{RelevanceMatch, SchemaEmbedder};
use crate::config::RetrievalSettings;

/// Default number of schema elements retrieved per question.
pub const DEFAULT_TOP_K: usize = 10;

/// Schema context selected for one question.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    /// Tables touched by the matches, in order of first appearance.
    pub relevant_tables: Vec<String>,
    pub focused_context: String,
    /// Ranked matches, best first.
    pub top_matches: Vec<RelevanceMatch>,
    /// Set when retrieval produced no matches or failed and the context is
    /// empty or a full-schema fallback.
    pub degraded: bool,
}

impl RetrievalResult {
    /// Similarity scores of the best `n` matches.
    pub fn top_scores(&self, n: usize) -> Vec<f32> {
        self.top_matches.iter().take(n).map(|m| m.similarity).collect()
    }
}

/// Selects the schema context for a question.
pub struct QueryProcessor {
    embedder: Arc<SchemaEmbedder>,
    assembler: ContextAssembler,
    top_k: usize,
}

impl QueryProcessor {
    pub fn new(embedder: Arc<SchemaEmbedder>) -> Self {
        Self {
            embedder,
            assembler: ContextAssembler::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_settings(embedder: Arc<SchemaEmbedder>, settings: &RetrievalSettings) -> Self {
        Self {
            embedder,
            assembler: ContextAssembler::new(settings.max_columns_per_table),
            top_k: settings.top_k,
        }
    }

    pub fn embedder(&self) -> &Arc<SchemaEmbedder> {
        &self.embedder
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Retrieve the most relevant schema elements and render them.
    ///
    /// Never fails. When relevance search errors, the full schema is rendered
    /// instead, or nothing if the snapshot is unavailable too.
    pub async fn process_query(&self, question: &str) -> RetrievalResult {
        match self.embedder.find_relevant_schema(question, self.top_k).await {
            Ok(matches) => {
                debug!(matches = matches.len(), "retrieved schema elements");
                RetrievalResult {
                    relevant_tables: self.assembler.relevant_tables(&matches),
                    focused_context: self.assembler.focused_context(&matches),
                    degraded: matches.is_empty(),
                    top_matches: matches,
                }
            }
            Err(e) => {
                warn!(error = %e, "schema retrieval failed, falling back to full schema");
                self.fallback().await
            }
        }
    }

    /// Render every table of a fresh snapshot, skipping relevance search.
    ///
    /// Degraded when the snapshot is empty or cannot be fetched.
    pub async fn full_schema(&self) -> RetrievalResult {
        self.render_full_schema(false).await
    }

    async fn fallback(&self) -> RetrievalResult {
        self.render_full_schema(true).await
    }

    async fn render_full_schema(&self, degraded: bool) -> RetrievalResult {
        let (relevant_tables, focused_context) = match self.embedder.provider().snapshot().await {
            Ok(snapshot) => (
                snapshot.table_names().map(str::to_string).collect::<Vec<_>>(),
                self.assembler.full_schema_context(&snapshot),
            ),
            Err(e) => {
                warn!(error = %e, "schema snapshot unavailable, continuing without context");
                (Vec::new(), String::new())
            }
        };

        RetrievalResult {
            degraded: degraded || relevant_tables.is_empty(),
            relevant_tables,
            focused_context,
            top_matches: Vec::new(),
        }
    }
}
