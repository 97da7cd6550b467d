//! TOML-based configuration for Quarry.
//!
//! Supports a config file (quarry.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [clickhouse]
//! host = "localhost"
//! port = 8123
//! database = "analytics"
//! password = "${CLICKHOUSE_PASSWORD}"
//!
//! [llm]
//! model = "gpt-3.5-turbo"
//! api_key = "${OPENAI_API_KEY}"
//!
//! [embedding]
//! model = "sentence"
//! model_repo = "sentence-transformers/all-MiniLM-L6-v2"
//! cache_backend = "sqlite"
//!
//! [retrieval]
//! top_k = 10
//! max_columns_per_table = 8
//!
//! [validator]
//! max_length = 10000
//! max_joins = 5
//! max_open_parens = 20
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::connection::ClickHouseSettings;
use crate::embedding::DEFAULT_SENTENCE_MODEL;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// ClickHouse connection.
    pub clickhouse: ClickHouseSettings,

    /// Language model used to generate SQL.
    pub llm: LlmSettings,

    /// Embedding model and cache.
    pub embedding: EmbeddingSettings,

    /// Schema retrieval.
    pub retrieval: RetrievalSettings,

    /// SQL validator limits.
    pub validator: ValidatorSettings,
}

/// Language model configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSettings {
    /// API key (supports ${ENV_VAR} expansion, falls back to `OPENAI_API_KEY`).
    pub api_key: String,

    /// Chat model name.
    pub model: String,

    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Maximum tokens in the completion.
    pub max_tokens: u32,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            temperature: 0.1,
            max_tokens: 300,
            timeout_secs: 60,
        }
    }
}

impl LlmSettings {
    /// Get the API key, expanding environment variables.
    ///
    /// An empty key falls back to the `OPENAI_API_KEY` environment variable.
    pub fn resolved_api_key(&self) -> Result<String, SettingsError> {
        let key = expand_env_vars(&self.api_key)?;
        if !key.is_empty() {
            return Ok(key);
        }
        env::var("OPENAI_API_KEY").map_err(|_| SettingsError::MissingEnvVar("OPENAI_API_KEY".into()))
    }
}

/// Where the embedding cache is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// SQLite database (`~/.quarry/embeddings.db` by default).
    Sqlite,
    /// Single JSON file (`~/.quarry/embeddings.json` by default).
    Json,
    /// Not persisted.
    Memory,
}

/// Which embedding model encodes schema descriptions and questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// BERT sentence model (all-MiniLM-L6-v2 by default).
    Sentence,
    /// Lexical feature hashing; no weights or network needed.
    Hashing,
}

/// Embedding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Model kind.
    pub model: ModelKind,

    /// HuggingFace Hub repository of the sentence model.
    pub model_repo: String,

    /// Local directory with `config.json`, `tokenizer.json` and
    /// `model.safetensors`, used instead of the Hub.
    pub model_dir: Option<String>,

    /// Vector length produced by the hashing model.
    pub dimension: usize,

    /// Cache persistence backend.
    pub cache_backend: CacheBackend,

    /// Override for the cache location.
    pub cache_path: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: ModelKind::Sentence,
            model_repo: DEFAULT_SENTENCE_MODEL.to_string(),
            model_dir: None,
            dimension: 384,
            cache_backend: CacheBackend::Sqlite,
            cache_path: None,
        }
    }
}

impl EmbeddingSettings {
    /// Local model directory, expanding environment variables.
    pub fn resolved_model_dir(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.model_dir
            .as_deref()
            .map(|dir| expand_env_vars(dir).map(PathBuf::from))
            .transpose()
    }

    /// Resolve the cache file path for the configured backend.
    ///
    /// Returns `None` for the memory backend.
    pub fn resolved_cache_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        if self.cache_backend == CacheBackend::Memory {
            return Ok(None);
        }

        if let Some(path) = &self.cache_path {
            return Ok(Some(PathBuf::from(expand_env_vars(path)?)));
        }

        let file_name = match self.cache_backend {
            CacheBackend::Sqlite => "embeddings.db",
            CacheBackend::Json => "embeddings.json",
            CacheBackend::Memory => return Ok(None),
        };
        let base = dirs::home_dir().ok_or(SettingsError::NoCacheDir)?;
        Ok(Some(base.join(".quarry").join(file_name)))
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of schema elements retrieved per question.
    pub top_k: usize,

    /// Maximum column lines rendered per table in the focused context.
    pub max_columns_per_table: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            max_columns_per_table: 8,
        }
    }
}

/// SQL validator limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidatorSettings {
    /// Maximum statement length in characters.
    pub max_length: usize,

    /// Maximum number of `JOIN` occurrences.
    pub max_joins: usize,

    /// Maximum number of `(` characters.
    pub max_open_parens: usize,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            max_length: 10_000,
            max_joins: 5,
            max_open_parens: 20,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.check()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `~/.config/quarry/config.toml`
    ///
    /// `CLICKHOUSE_*` environment variables override the loaded connection.
    pub fn load() -> Result<Self, SettingsError> {
        let mut settings = Self::load_file()?;
        settings.clickhouse = settings.clickhouse.with_env_overrides();
        Ok(settings)
    }

    fn load_file() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUARRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        // Return defaults if no config file found
        Ok(Settings::default())
    }

    fn check(&self) -> Result<(), SettingsError> {
        if self.embedding.dimension == 0 {
            return Err(SettingsError::InvalidConfig(
                "embedding.dimension must be greater than zero".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(SettingsError::InvalidConfig(
                "retrieval.top_k must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if !(ch.is_alphanumeric() || ch == '_') {
                    break;
                }
                var_name.push(ch);
                chars.next();
            }
            if var_name.is_empty() {
                // Just a lone $, keep it
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
