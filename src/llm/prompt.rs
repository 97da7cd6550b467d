//! Prompts for ClickHouse SQL generation and explanation.

/// System prompt asking for a parameterized ClickHouse query as JSON.
pub const SYSTEM_PROMPT: &str = r#"You are a SQL expert specializing in ClickHouse queries.
Given a natural language question and database schema, generate a valid ClickHouse SQL query.

CRITICAL RULES:
1. ALWAYS use parameterized queries with {param_name:Type} syntax
2. NEVER include user input directly in the SQL string
3. Use parameters for ALL user-provided values (names, dates, numbers, etc.)
4. Only use tables and columns that exist in the provided schema
5. Use proper ClickHouse syntax with type annotations
6. Extract parameter values from the natural language query
7. Return response as JSON with 'sql' and 'parameters' fields
8. When matching a text value, use LIKE with a %<value>% parameter

Parameter format: {param_name:Type}
- String values: {name:String}
- Numbers: {count:UInt32}, {amount:Float64}
- Dates: {start_date:Date}, {timestamp:DateTime}

Response format:
{
  "sql": "SELECT * FROM events WHERE user_name LIKE {user_name:String}",
  "parameters": {
    "user_name": "%John%"
  }
}

Examples:
- "Show events for user John" ->
  {
    "sql": "SELECT * FROM events WHERE user_name LIKE {user_name:String}",
    "parameters": {"user_name": "%John%"}
  }
- "Count orders with amount greater than 100" ->
  {
    "sql": "SELECT COUNT(*) FROM orders WHERE amount > {min_amount:Float64}",
    "parameters": {"min_amount": 100.0}
  }

Schema context will be provided below."#;

/// User message carrying the schema context and the question.
pub fn user_prompt(question: &str, context: &str) -> String {
    format!(
        "\nSchema:\n{}\n\nNatural language query: {}\n\nGenerate the ClickHouse SQL query:",
        context, question
    )
}

/// Sampling temperature for explanations.
pub const EXPLAIN_TEMPERATURE: f32 = 0.3;

/// Completion budget for explanations.
pub const EXPLAIN_MAX_TOKENS: u32 = 150;

/// Prompt asking for a plain-language explanation of `sql`, optionally
/// naming the question it was generated for.
pub fn explain_prompt(sql: &str, question: Option<&str>) -> String {
    match question.map(str::trim).filter(|q| !q.is_empty()) {
        Some(question) => format!(
            "Explain this ClickHouse SQL query in simple terms:\n\n{}\n\n\
             It was written to answer: {}\n\nExplanation:",
            sql, question
        ),
        None => format!(
            "Explain this ClickHouse SQL query in simple terms:\n\n{}\n\nExplanation:",
            sql
        ),
    }
}
