//! ClickHouse HTTP gateway.
//!
//! Statements are POSTed as the request body. Named parameters written as
//! `{name:Type}` in the SQL are bound server-side from `param_<name>` query
//! arguments, so values never get spliced into the statement text.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::error::{ExecutionError, ExecutionResult};
use super::{ExecutionGateway, Parameters, QueryResult};
use crate::config::ClickHouseSettings;

/// Output format requested from the server.
const OUTPUT_FORMAT: &str = "JSONCompact";

/// Gateway speaking the ClickHouse HTTP interface.
#[derive(Clone)]
pub struct ClickHouseGateway {
    client: reqwest::Client,
    url: String,
    user: String,
    password: String,
    database: String,
}

#[derive(Debug, Deserialize)]
struct ColumnMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CompactResponse {
    #[serde(default)]
    meta: Vec<ColumnMeta>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}

impl ClickHouseGateway {
    /// Create a gateway from connection settings.
    pub fn new(settings: &ClickHouseSettings) -> ExecutionResult<Self> {
        let password = settings
            .resolved_password()
            .map_err(|e| ExecutionError::InvalidConfig(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: settings.base_url(),
            user: settings.user.clone(),
            password,
            database: settings.database.clone(),
        })
    }

    /// Database this gateway queries by default.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Build the query-string arguments for a request.
    fn query_args(&self, parameters: &Parameters) -> ExecutionResult<Vec<(String, String)>> {
        let mut args = vec![
            ("database".to_string(), self.database.clone()),
            ("default_format".to_string(), OUTPUT_FORMAT.to_string()),
        ];
        for (name, value) in parameters {
            args.push((format!("param_{}", name), parameter_text(name, value)?));
        }
        Ok(args)
    }
}

/// Render a parameter value the way ClickHouse parses `param_*` arguments.
///
/// Values are read in the escaped (TSV) text format, so strings have their
/// control characters and backslashes escaped. Array elements are quoted.
fn parameter_text(name: &str, value: &Value) -> ExecutionResult<String> {
    match value {
        Value::String(s) => Ok(escape_text(s)),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("\\N".to_string()),
        Value::Array(items) => {
            let rendered = items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(format!("'{}'", escape_text(s).replace('\'', "\\'"))),
                    Value::Number(n) => Ok(n.to_string()),
                    Value::Bool(b) => Ok(b.to_string()),
                    _ => Err(ExecutionError::UnsupportedParameter(name.to_string())),
                })
                .collect::<ExecutionResult<Vec<_>>>()?;
            Ok(format!("[{}]", rendered.join(",")))
        }
        Value::Object(_) => Err(ExecutionError::UnsupportedParameter(name.to_string())),
    }
}

/// Escape a string for the TSV text format.
fn escape_text(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\0' => escaped.push_str("\\0"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Decode a `JSONCompact` body. Statements without a result set return an
/// empty body.
fn decode_body(body: &str) -> ExecutionResult<QueryResult> {
    if body.trim().is_empty() {
        return Ok(QueryResult::default());
    }
    let response: CompactResponse = serde_json::from_str(body).map_err(ExecutionError::Decode)?;
    Ok(QueryResult {
        columns: response.meta.into_iter().map(|m| m.name).collect(),
        rows: response.data,
    })
}

#[async_trait]
impl ExecutionGateway for ClickHouseGateway {
    async fn execute(&self, sql: &str, parameters: &Parameters) -> ExecutionResult<QueryResult> {
        let args = self.query_args(parameters)?;
        debug!(sql, params = parameters.len(), "executing statement");

        let mut request = self.client.post(&self.url).query(&args).body(sql.to_string());
        if !self.user.is_empty() {
            request = request.header("X-ClickHouse-User", &self.user);
        }
        if !self.password.is_empty() {
            request = request.header("X-ClickHouse-Key", &self.password);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ExecutionError::database(status.as_u16(), body.trim()));
        }

        decode_body(&body)
    }
}
