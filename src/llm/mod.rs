//! SQL generation.
//!
//! The generator is an external collaborator: given a question and a schema
//! context it proposes a parameterized statement. Its output is untrusted
//! and always goes through [`crate::validation::SqlValidator`] before
//! execution.
//!
//! [`OpenAiGenerator`] talks to an OpenAI-compatible chat completions API.
//! Other backends implement [`SqlGenerator`].

mod openai;
mod prompt;
mod response;

pub use openai::OpenAiGenerator;
pub use prompt::{
    explain_prompt, user_prompt, EXPLAIN_MAX_TOKENS, EXPLAIN_TEMPERATURE, SYSTEM_PROMPT,
};
pub use response::{parse_response, sanitize_sql, strip_code_fences, UNPARSED_PARAMETERS_WARNING};

use async_trait::async_trait;

use crate::gateway::Parameters;

/// Errors raised by a SQL generator.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request to language model failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("language model API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("language model returned no completion")]
    EmptyResponse,

    #[error("invalid generator configuration: {0}")]
    Config(String),
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// A candidate statement proposed by a generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSql {
    /// Sanitized SQL: whitespace collapsed, no `;`.
    pub sql: String,
    /// Named parameters referenced as `{name:Type}` in `sql`.
    pub parameters: Parameters,
    pub model: String,
    /// Set when the response could only be partially understood.
    pub warning: Option<String>,
}

/// Turns a question and schema context into a candidate statement.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, question: &str, context: &str) -> GenerationResult<GeneratedSql>;
}
