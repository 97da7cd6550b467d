//! OpenAI-compatible chat completions generator.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::prompt::{
    explain_prompt, user_prompt, EXPLAIN_MAX_TOKENS, EXPLAIN_TEMPERATURE, SYSTEM_PROMPT,
};
use super::response::parse_response;
use super::{GeneratedSql, GenerationError, GenerationResult, SqlGenerator};
use crate::config::LlmSettings;

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

/// Generates SQL through a chat completions endpoint.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    /// Create a generator with an explicit API key.
    pub fn new(api_key: impl Into<String>, settings: &LlmSettings) -> GenerationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    /// Create a generator, resolving the API key from settings or
    /// `OPENAI_API_KEY`.
    pub fn from_settings(settings: &LlmSettings) -> GenerationResult<Self> {
        let api_key = settings
            .resolved_api_key()
            .map_err(|e| GenerationError::Config(e.to_string()))?;
        Self::new(api_key, settings)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Explain `sql` in plain language. `question` is the question the
    /// statement was generated for, if any.
    pub async fn explain(&self, sql: &str, question: Option<&str>) -> GenerationResult<String> {
        debug!(model = %self.model, "requesting explanation");
        let body = self.request_body(
            None,
            &explain_prompt(sql, question),
            EXPLAIN_TEMPERATURE,
            EXPLAIN_MAX_TOKENS,
        );
        let text = self.complete(&body).await?;
        Ok(text.trim().to_string())
    }

    fn request_body(
        &self,
        system: Option<&str>,
        user: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Value {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": user}));

        json!({
            "model": &self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens
        })
    }

    async fn complete(&self, body: &Value) -> GenerationResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, message });
        }

        let chat: ChatResponse = response.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(GenerationError::EmptyResponse)
    }
}

#[async_trait]
impl SqlGenerator for OpenAiGenerator {
    async fn generate(&self, question: &str, context: &str) -> GenerationResult<GeneratedSql> {
        debug!(model = %self.model, context_len = context.len(), "requesting SQL");
        let body = self.request_body(
            Some(SYSTEM_PROMPT),
            &user_prompt(question, context),
            self.temperature,
            self.max_tokens,
        );
        let raw = self.complete(&body).await?;
        Ok(parse_response(&raw, &self.model))
    }
}
