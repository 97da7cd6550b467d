//! Schema embedding and relevance search.

use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use tracing::{debug, info};

use super::element::{elements_from_snapshot, SchemaElement};
use super::RetrievalError;
use crate::embedding::EmbeddingIndex;
use crate::metadata::{MetadataProvider, SchemaSnapshot};

/// A schema element together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedElement {
    pub element: SchemaElement,
    pub embedding: Vec<f32>,
}

/// A schema element scored against a question.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceMatch {
    pub element: SchemaElement,
    /// Cosine similarity in `[-1, 1]`.
    pub similarity: f32,
}

/// Embeds a schema snapshot and finds the elements most relevant to a
/// question.
///
/// Elements are stored keyed by description. Reads clone stored elements, so
/// a [`RelevanceMatch`] never aliases stored state.
pub struct SchemaEmbedder {
    provider: Arc<dyn MetadataProvider>,
    index: Arc<EmbeddingIndex>,
    elements: Mutex<IndexMap<String, EmbeddedElement>>,
}

impl SchemaEmbedder {
    pub fn new(provider: Arc<dyn MetadataProvider>, index: Arc<EmbeddingIndex>) -> Self {
        Self {
            provider,
            index,
            elements: Mutex::new(IndexMap::new()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn MetadataProvider> {
        &self.provider
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    fn elements(&self) -> MutexGuard<'_, IndexMap<String, EmbeddedElement>> {
        self.elements.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch a fresh snapshot from the provider and embed it.
    pub async fn embed_schema(&self) -> Result<Vec<EmbeddedElement>, RetrievalError> {
        let snapshot = self.provider.snapshot().await?;
        self.embed_snapshot(&snapshot)
    }

    /// Embed every table and column of `snapshot`, replacing whatever was
    /// stored before.
    ///
    /// All descriptions go to the index in one batch. When two elements share
    /// a description, the later one replaces the earlier but keeps its
    /// position.
    pub fn embed_snapshot(
        &self,
        snapshot: &SchemaSnapshot,
    ) -> Result<Vec<EmbeddedElement>, RetrievalError> {
        let elements = elements_from_snapshot(snapshot);
        let descriptions: Vec<&str> = elements.iter().map(SchemaElement::description).collect();
        let embeddings = self.index.embed_batch(&descriptions)?;

        let embedded: Vec<EmbeddedElement> = elements
            .into_iter()
            .zip(embeddings)
            .map(|(element, embedding)| EmbeddedElement { element, embedding })
            .collect();

        let mut stored = IndexMap::with_capacity(embedded.len());
        for item in &embedded {
            stored.insert(item.element.description().to_string(), item.clone());
        }

        *self.elements() = stored;
        info!(elements = embedded.len(), tables = snapshot.len(), "embedded schema elements");
        Ok(embedded)
    }

    /// Rank stored elements against `query`, embedding the schema first if
    /// nothing is stored.
    pub async fn find_relevant_schema(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RelevanceMatch>, RetrievalError> {
        if !self.is_embedded() {
            debug!("schema not embedded yet, embedding now");
            self.embed_schema().await?;
        }
        self.rank_stored(query, top_k)
    }

    /// Rank the currently stored elements against `query`.
    pub fn rank_stored(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RelevanceMatch>, RetrievalError> {
        let descriptions: Vec<String> = self.elements().keys().cloned().collect();
        let ranked = self.index.find_similar(query, &descriptions, top_k)?;

        let stored = self.elements();
        Ok(ranked
            .into_iter()
            .filter_map(|(description, similarity)| {
                stored.get(&description).map(|item| RelevanceMatch {
                    element: item.element.clone(),
                    similarity,
                })
            })
            .collect())
    }

    pub fn is_embedded(&self) -> bool {
        !self.elements().is_empty()
    }

    /// Number of distinct stored elements.
    pub fn element_count(&self) -> usize {
        self.elements().len()
    }

    /// Drop stored elements so the next search re-embeds the schema.
    pub fn reset(&self) {
        self.elements().clear();
    }
}
