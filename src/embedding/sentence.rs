//! BERT sentence encoder.
//!
//! Runs `sentence-transformers/all-MiniLM-L6-v2` (or another BERT checkpoint
//! with the same file layout) on the CPU with candle. Token states are
//! mean-pooled over the attention mask and L2-normalized, which matches how
//! sentence-transformers produces MiniLM embeddings.
//!
//! Model files come from the HuggingFace Hub cache (`~/.cache/huggingface`,
//! downloaded on first use) or from a local directory holding
//! `config.json`, `tokenizer.json` and `model.safetensors`.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::model::EmbeddingModel;
use super::similarity::l2_normalize;
use super::{EmbeddingError, EmbeddingResult};

/// Default checkpoint on the HuggingFace Hub.
pub const DEFAULT_SENTENCE_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Longest input in tokens; longer texts are truncated.
const MAX_SEQUENCE_LENGTH: usize = 256;

/// Paths of the three files a checkpoint consists of.
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

/// Mean-pooled BERT sentence embeddings.
pub struct SentenceEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    name: String,
}

impl SentenceEncoder {
    /// Load [`DEFAULT_SENTENCE_MODEL`] from the Hub.
    pub fn new() -> EmbeddingResult<Self> {
        Self::from_hub(DEFAULT_SENTENCE_MODEL)
    }

    /// Load a checkpoint from the Hub, downloading it if it is not cached.
    pub fn from_hub(repo_id: &str) -> EmbeddingResult<Self> {
        info!(model = repo_id, "loading embedding model");

        let api = Api::new().map_err(|e| load_error("HuggingFace API client", e))?;
        let repo = api.repo(Repo::new(repo_id.to_string(), RepoType::Model));

        let files = ModelFiles {
            config: repo.get("config.json").map_err(|e| load_error("config.json", e))?,
            tokenizer: repo
                .get("tokenizer.json")
                .map_err(|e| load_error("tokenizer.json", e))?,
            weights: repo
                .get("model.safetensors")
                .map_err(|e| load_error("model.safetensors", e))?,
        };
        debug!("model files available in hub cache");

        Self::load(files, repo_id)
    }

    /// Load a checkpoint from a local directory. `name` identifies the model
    /// in logs and in the embedding cache.
    pub fn from_dir(dir: impl AsRef<Path>, name: impl Into<String>) -> EmbeddingResult<Self> {
        let dir = dir.as_ref();
        let name = name.into();
        info!(model = %name, dir = %dir.display(), "loading embedding model");

        let files = ModelFiles {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        };
        Self::load(files, &name)
    }

    fn load(files: ModelFiles, name: &str) -> EmbeddingResult<Self> {
        let device = Device::Cpu;

        let config_text =
            std::fs::read_to_string(&files.config).map_err(|e| load_error("config.json", e))?;
        let config: Config =
            serde_json::from_str(&config_text).map_err(|e| load_error("config.json", e))?;

        let mut tokenizer =
            Tokenizer::from_file(&files.tokenizer).map_err(|e| load_error("tokenizer.json", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| load_error("tokenizer.json", e))?;

        // SAFETY: the weights file is not modified while it is mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[files.weights], DTYPE, &device)? };
        let model = BertModel::load(vb, &config)?;

        let dimension = config.hidden_size;
        info!(model = name, dimension, "embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
            name: name.to_string(),
        })
    }

    fn forward_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Model(format!("tokenization failed: {}", e)))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask = Vec::with_capacity(batch_size * max_len);
        let mut token_type_ids = Vec::with_capacity(batch_size * max_len);
        for encoding in &encodings {
            let pad = max_len - encoding.get_ids().len();
            input_ids.extend(encoding.get_ids().iter().copied().chain(std::iter::repeat(0).take(pad)));
            attention_mask.extend(
                encoding
                    .get_attention_mask()
                    .iter()
                    .copied()
                    .chain(std::iter::repeat(0).take(pad)),
            );
            token_type_ids.extend(
                encoding
                    .get_type_ids()
                    .iter()
                    .copied()
                    .chain(std::iter::repeat(0).take(pad)),
            );
        }

        let input_ids = Tensor::from_vec(input_ids, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(attention_mask, (batch_size, max_len), &self.device)?;
        let token_type_ids = Tensor::from_vec(token_type_ids, (batch_size, max_len), &self.device)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = mean_pool(&hidden, &attention_mask)?;

        let mut vectors = pooled.to_vec2::<f32>()?;
        for vector in &mut vectors {
            l2_normalize(vector);
        }
        Ok(vectors)
    }
}

impl EmbeddingModel for SentenceEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        debug!(texts = texts.len(), "encoding with sentence model");
        self.forward_batch(texts)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Average token states over positions where `attention_mask` is set.
///
/// `hidden` is `(batch, seq, hidden)`, `attention_mask` is `(batch, seq)`;
/// the result is `(batch, hidden)`.
fn mean_pool(hidden: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
    let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    summed.broadcast_div(&counts)
}

fn load_error(what: &str, e: impl Display) -> EmbeddingError {
    EmbeddingError::Model(format!("failed to load {}: {}", what, e))
}
