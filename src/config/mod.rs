//! Configuration module for Quarry.
//!
//! Handles the config file, environment variables, and connection settings.

mod connection;
mod settings;

pub use connection::{ClickHouseSettings, DEFAULT_HTTP_PORT};
pub use settings::{
    expand_env_vars, CacheBackend, EmbeddingSettings, LlmSettings, ModelKind, RetrievalSettings,
    Settings, SettingsError, ValidatorSettings,
};
