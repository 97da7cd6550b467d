//! Parsing generator responses.

use serde_json::Value;
use tracing::warn;

use super::GeneratedSql;
use crate::gateway::Parameters;

/// Warning attached when a response is not the expected JSON object.
pub const UNPARSED_PARAMETERS_WARNING: &str = "Could not parse parameters from response";

/// Collapse whitespace runs to single spaces and remove every `;`.
pub fn sanitize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ").replace(';', "")
}

/// Remove one surrounding markdown code fence (` ```json `, ` ```sql ` or
/// plain ` ``` `), if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let inner = ["```json", "```sql", "```"]
        .iter()
        .find_map(|fence| trimmed.strip_prefix(*fence))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Interpret a raw completion.
///
/// A JSON object `{"sql": ..., "parameters": {...}}` yields its statement and
/// parameters. Anything else is taken as the statement itself, with no
/// parameters and a warning. The statement is sanitized either way.
pub fn parse_response(raw: &str, model: &str) -> GeneratedSql {
    let content = sanitize_sql(strip_code_fences(raw));

    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(object)) => {
            let sql = object.get("sql").and_then(Value::as_str).unwrap_or_default();
            let parameters = match object.get("parameters") {
                Some(Value::Object(params)) => params.clone(),
                _ => Parameters::new(),
            };
            GeneratedSql {
                sql: sanitize_sql(sql),
                parameters,
                model: model.to_string(),
                warning: None,
            }
        }
        _ => {
            warn!(model = %model, "generator response is not a JSON object, using it as SQL");
            GeneratedSql {
                sql: content,
                parameters: Parameters::new(),
                model: model.to_string(),
                warning: Some(UNPARSED_PARAMETERS_WARNING.to_string()),
            }
        }
    }
}
