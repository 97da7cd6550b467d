//! Embedding models.
//!
//! The index only needs something that turns a batch of strings into
//! fixed-length vectors. Neural sentence encoders plug in behind
//! [`EmbeddingModel`]; the crate ships [`HashingEmbedder`], a local model
//! that needs no weights or network.

use sha2::{Digest, Sha256};

use super::similarity::l2_normalize;
use super::{EmbeddingError, EmbeddingResult};

/// Default vector length.
pub const DEFAULT_DIMENSION: usize = 384;

/// Turns text into fixed-length vectors.
pub trait EmbeddingModel: Send + Sync {
    /// Length of every vector this model produces.
    fn dimension(&self) -> usize;

    /// Encode a batch of texts, one vector per input, in input order.
    fn encode(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Model name, for logs.
    fn name(&self) -> &str;
}

/// Feature-hashing bag-of-words model.
///
/// Each text is lowercased and split into alphanumeric words. Every word and
/// every character trigram of the `#`-padded word is hashed with SHA-256
/// into one of `dimension` buckets with a hash-derived sign, and the result
/// is L2-normalized. Shared vocabulary, including partial word overlap such
/// as `order`/`orders`, yields positive cosine similarity.
///
/// Text without any alphanumeric character encodes to the zero vector.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

impl HashingEmbedder {
    pub fn new(dimension: usize) -> EmbeddingResult<Self> {
        if dimension == 0 {
            return Err(EmbeddingError::Model("dimension must be greater than zero".into()));
        }
        Ok(Self { dimension })
    }

    fn encode_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();

        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            self.add_feature(&mut vector, "w", word, WORD_WEIGHT);

            let padded: Vec<char> = std::iter::once('#')
                .chain(word.chars())
                .chain(std::iter::once('#'))
                .collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut vector, "t", &gram, TRIGRAM_WEIGHT);
            }
        }

        l2_normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], kind: &str, feature: &str, weight: f32) {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update([0u8]);
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();

        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
        }
    }
}

impl EmbeddingModel for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode_one(t)).collect())
    }

    fn name(&self) -> &str {
        "hashing"
    }
}
