//! Text embeddings and similarity search.
//!
//! ```text
//! text ──► EmbeddingIndex ──(cache miss)──► EmbeddingModel::encode
//!              │
//!              ├──► text -> id -> vector table (in memory)
//!              └──► EmbeddingStore::save (explicit)
//! ```
//!
//! [`EmbeddingIndex`] memoizes vectors per distinct text and ranks candidate
//! texts against a query by cosine similarity.
//!
//! Two models ship with the crate: [`SentenceEncoder`], a BERT sentence
//! model and the default, and [`HashingEmbedder`], a lexical model that
//! needs no weights.

mod index;
mod model;
mod sentence;
mod similarity;

pub use index::{EmbeddingIndex, EmbeddingRecord, IndexStats};
pub use model::{EmbeddingModel, HashingEmbedder, DEFAULT_DIMENSION};
pub use sentence::{SentenceEncoder, DEFAULT_SENTENCE_MODEL};
pub use similarity::{cosine_similarity, l2_normalize, rank};

use std::sync::Arc;

use crate::config::{EmbeddingSettings, ModelKind};

/// Errors raised while computing embeddings.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding model error: {0}")]
    Model(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Embedding model returned {found} vectors for {expected} texts")]
    CountMismatch { expected: usize, found: usize },

    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Build the model selected by `settings`.
///
/// The sentence model is read from `model_dir` when set, otherwise from the
/// HuggingFace Hub.
pub fn model_from_settings(settings: &EmbeddingSettings) -> EmbeddingResult<Arc<dyn EmbeddingModel>> {
    match settings.model {
        ModelKind::Sentence => {
            let dir = settings
                .resolved_model_dir()
                .map_err(|e| EmbeddingError::Model(e.to_string()))?;
            let encoder = match dir {
                Some(dir) => SentenceEncoder::from_dir(dir, &settings.model_repo)?,
                None => SentenceEncoder::from_hub(&settings.model_repo)?,
            };
            Ok(Arc::new(encoder))
        }
        ModelKind::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimension)?)),
    }
}
