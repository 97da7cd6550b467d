//! Question to validated, executed SQL.
//!
//! ```text
//! question ─► QueryProcessor ─► SqlGenerator ─► SqlValidator ─► ExecutionGateway
//!                (context)        (candidate)      (verdict)         (rows)
//! ```
//!
//! A statement the validator refuses never reaches the gateway. That holds
//! for caller-supplied SQL too ([`Pipeline::execute_sql`]).

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::gateway::{ExecutionError, ExecutionGateway, Parameters, QueryResult};
use crate::llm::{GenerationError, SqlGenerator};
use crate::retrieval::QueryProcessor;
use crate::validation::{SqlValidator, ValidationVerdict};

/// Number of similarity scores reported on an outcome.
const REPORTED_SCORES: usize = 5;

/// Errors that end a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("question cannot be empty")]
    EmptyQuestion,

    #[error("SQL was rejected: {0}")]
    ValidationRejected(ValidationVerdict),

    #[error("SQL generation failed: {0}")]
    GenerationFailed(#[from] GenerationError),

    #[error("query execution failed: {0}")]
    ExecutionFailed(#[from] ExecutionError),
}

impl PipelineError {
    /// Whether the caller can fix this by rephrasing the question, as opposed
    /// to a failure of the generator or the database.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::EmptyQuestion | Self::ValidationRejected(_))
    }

    /// Whether running again unchanged may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::ExecutionFailed(e) => e.is_retriable(),
            _ => false,
        }
    }
}

/// Where the generator's schema context comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContextMode {
    /// The elements most relevant to the question.
    #[default]
    Retrieved,
    /// Every table of the schema.
    FullSchema,
}

/// Everything produced while answering one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub question: String,
    pub sql: String,
    pub parameters: Parameters,
    pub relevant_tables: Vec<String>,
    pub context_elements_used: usize,
    /// Scores of the best matches, at most five.
    pub similarity_scores: Vec<f32>,
    /// Schema retrieval found nothing or fell back to the full schema.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Rows, when the statement was executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResult>,
}

/// Wires retrieval, generation, validation and execution together.
pub struct Pipeline {
    processor: QueryProcessor,
    generator: Arc<dyn SqlGenerator>,
    validator: SqlValidator,
    gateway: Arc<dyn ExecutionGateway>,
}

impl Pipeline {
    pub fn new(
        processor: QueryProcessor,
        generator: Arc<dyn SqlGenerator>,
        validator: SqlValidator,
        gateway: Arc<dyn ExecutionGateway>,
    ) -> Self {
        Self {
            processor,
            generator,
            validator,
            gateway,
        }
    }

    pub fn processor(&self) -> &QueryProcessor {
        &self.processor
    }

    pub fn validator(&self) -> &SqlValidator {
        &self.validator
    }

    /// Answer a question: generate, validate and execute a statement.
    pub async fn run(&self, question: &str) -> Result<QueryOutcome, PipelineError> {
        self.answer(question, ContextMode::Retrieved, true).await
    }

    /// Generate and validate a statement without executing it.
    pub async fn generate_only(&self, question: &str) -> Result<QueryOutcome, PipelineError> {
        self.answer(question, ContextMode::Retrieved, false).await
    }

    /// Generate a statement from a context built per `mode`, validate it,
    /// and execute it when `execute` is set.
    pub async fn answer(
        &self,
        question: &str,
        mode: ContextMode,
        execute: bool,
    ) -> Result<QueryOutcome, PipelineError> {
        if question.trim().is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        let retrieval = match mode {
            ContextMode::Retrieved => self.processor.process_query(question).await,
            ContextMode::FullSchema => self.processor.full_schema().await,
        };
        if retrieval.degraded {
            warn!(tables = retrieval.relevant_tables.len(), "schema retrieval degraded");
        }

        let generated = self.generator.generate(question, &retrieval.focused_context).await?;
        if let Some(warning) = &generated.warning {
            warn!(model = %generated.model, warning = %warning, "generator warning");
        }

        let verdict = self.validator.validate(&generated.sql);
        if !verdict.is_safe {
            warn!(sql = %generated.sql, reason = %verdict, "generated SQL rejected");
            return Err(PipelineError::ValidationRejected(verdict));
        }

        info!(
            tables = ?retrieval.relevant_tables,
            elements = retrieval.top_matches.len(),
            ?mode,
            "generated SQL accepted"
        );

        let result = if execute {
            let result = self.gateway.execute(&generated.sql, &generated.parameters).await?;
            info!(rows = result.row_count(), "query executed");
            Some(result)
        } else {
            None
        };

        Ok(QueryOutcome {
            question: question.to_string(),
            similarity_scores: retrieval.top_scores(REPORTED_SCORES),
            context_elements_used: retrieval.top_matches.len(),
            relevant_tables: retrieval.relevant_tables,
            degraded: retrieval.degraded,
            sql: generated.sql,
            parameters: generated.parameters,
            warning: generated.warning,
            result,
        })
    }

    /// Validate a caller-supplied statement and execute it.
    pub async fn execute_sql(
        &self,
        sql: &str,
        parameters: &Parameters,
    ) -> Result<QueryResult, PipelineError> {
        execute_validated(&self.validator, self.gateway.as_ref(), sql, parameters).await
    }
}

/// Validate `sql` and execute it only when the validator accepts it.
pub async fn execute_validated(
    validator: &SqlValidator,
    gateway: &dyn ExecutionGateway,
    sql: &str,
    parameters: &Parameters,
) -> Result<QueryResult, PipelineError> {
    let verdict = validator.validate(sql);
    if !verdict.is_safe {
        warn!(reason = %verdict, "supplied SQL rejected");
        return Err(PipelineError::ValidationRejected(verdict));
    }

    let result = gateway.execute(sql, parameters).await?;
    info!(rows = result.row_count(), "query executed");
    Ok(result)
}
