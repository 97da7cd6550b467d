use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use quarry::config::RetrievalSettings;
use quarry::embedding::{EmbeddingIndex, EmbeddingModel, EmbeddingResult};
use quarry::gateway::{ExecutionError, ExecutionGateway, ExecutionResult, Parameters, QueryResult};
use quarry::llm::{GeneratedSql, GenerationError, GenerationResult, SqlGenerator};
use quarry::metadata::{ColumnInfo, SchemaSnapshot, StaticMetadataProvider, TableInfo};
use quarry::pipeline::{execute_validated, ContextMode, Pipeline, PipelineError};
use quarry::retrieval::{QueryProcessor, SchemaEmbedder};
use quarry::validation::{ForbiddenKind, RejectionReason, SqlValidator};

/// Returns fixed vectors for known texts and a common orthogonal vector for
/// everything else.
struct FixedModel {
    vectors: HashMap<&'static str, Vec<f32>>,
}

impl FixedModel {
    fn new() -> Self {
        let mut vectors = HashMap::new();
        vectors.insert("count orders", vec![1.0, 0.0, 0.0]);
        vectors.insert("Table orders with columns: id, amount", vec![1.0, 0.0, 0.0]);
        vectors.insert(
            "Column amount in table orders of type Float64",
            vec![0.9, 0.1, 0.0],
        );
        vectors.insert("Column id in table orders of type UInt64", vec![0.8, 0.2, 0.0]);
        Self { vectors }
    }
}

impl EmbeddingModel for FixedModel {
    fn dimension(&self) -> usize {
        3
    }

    fn encode(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.vectors.get(*t).cloned().unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
            .collect())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Replies with a fixed response and records the context it was given.
struct StubGenerator {
    reply: Result<String, ()>,
    contexts: Mutex<Vec<String>>,
}

impl StubGenerator {
    fn replying(sql: &str) -> Self {
        Self {
            reply: Ok(sql.to_string()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            reply: Err(()),
            contexts: Mutex::new(Vec::new()),
        }
    }

    fn contexts(&self) -> Vec<String> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlGenerator for StubGenerator {
    async fn generate(&self, _question: &str, context: &str) -> GenerationResult<GeneratedSql> {
        self.contexts.lock().unwrap().push(context.to_string());
        match &self.reply {
            Ok(sql) => Ok(GeneratedSql {
                sql: sql.clone(),
                parameters: Parameters::new(),
                model: "stub".to_string(),
                warning: None,
            }),
            Err(()) => Err(GenerationError::EmptyResponse),
        }
    }
}

/// Records executed statements.
struct StubGateway {
    fail: bool,
    executed: Mutex<Vec<String>>,
}

impl StubGateway {
    fn new() -> Self {
        Self {
            fail: false,
            executed: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            executed: Mutex::new(Vec::new()),
        }
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionGateway for StubGateway {
    async fn execute(&self, sql: &str, _parameters: &Parameters) -> ExecutionResult<QueryResult> {
        self.executed.lock().unwrap().push(sql.to_string());
        if self.fail {
            return Err(ExecutionError::database(500, "Code: 60. Table default.orders does not exist"));
        }
        Ok(QueryResult {
            columns: vec!["count()".to_string()],
            rows: vec![vec![json!(42)]],
        })
    }
}

fn schema() -> SchemaSnapshot {
    let mut snapshot = SchemaSnapshot::new();
    snapshot.insert(TableInfo::new(
        "users",
        vec![ColumnInfo::new("id", "UInt64"), ColumnInfo::new("email", "String")],
    ));
    snapshot.insert(TableInfo::new(
        "orders",
        vec![ColumnInfo::new("id", "UInt64"), ColumnInfo::new("amount", "Float64")],
    ));
    snapshot
}

fn pipeline(
    provider: StaticMetadataProvider,
    generator: Arc<StubGenerator>,
    gateway: Arc<StubGateway>,
) -> Pipeline {
    let index = EmbeddingIndex::in_memory(Arc::new(FixedModel::new()));
    let embedder = SchemaEmbedder::new(Arc::new(provider), Arc::new(index));
    let settings = RetrievalSettings {
        top_k: 3,
        ..Default::default()
    };
    let processor = QueryProcessor::with_settings(Arc::new(embedder), &settings);
    Pipeline::new(processor, generator, SqlValidator::default(), gateway)
}

#[tokio::test]
async fn test_question_to_rows() {
    let generator = Arc::new(StubGenerator::replying("SELECT COUNT(*) FROM orders"));
    let gateway = Arc::new(StubGateway::new());
    let pipeline = pipeline(
        StaticMetadataProvider::new(schema()),
        generator.clone(),
        gateway.clone(),
    );

    let outcome = pipeline.run("count orders").await.unwrap();

    let contexts = generator.contexts();
    let context = &contexts[0];
    assert!(context.contains("Table: orders"));
    assert!(!context.contains("users"));
    assert_eq!(
        context,
        "Table: orders\nRelevant columns:\n  \
         - amount (Float64) (similarity: 0.99)\n  \
         - id (UInt64) (similarity: 0.97)\n"
    );

    assert_eq!(gateway.executed(), vec!["SELECT COUNT(*) FROM orders".to_string()]);

    assert_eq!(outcome.question, "count orders");
    assert_eq!(outcome.sql, "SELECT COUNT(*) FROM orders");
    assert_eq!(outcome.relevant_tables, vec!["orders".to_string()]);
    assert_eq!(outcome.context_elements_used, 3);
    assert_eq!(outcome.similarity_scores.len(), 3);
    assert!((outcome.similarity_scores[0] - 1.0).abs() < 1e-6);
    assert!(!outcome.degraded);
    assert_eq!(outcome.result.unwrap().rows, vec![vec![json!(42)]]);
}

#[tokio::test]
async fn test_rejected_sql_never_reaches_gateway() {
    let generator = Arc::new(StubGenerator::replying("DROP TABLE orders"));
    let gateway = Arc::new(StubGateway::new());
    let pipeline = pipeline(StaticMetadataProvider::new(schema()), generator, gateway.clone());

    let err = pipeline.run("count orders").await.unwrap_err();

    match &err {
        PipelineError::ValidationRejected(verdict) => {
            assert!(!verdict.is_safe);
            assert!(matches!(
                verdict.reason,
                Some(RejectionReason::ForbiddenPattern {
                    kind: ForbiddenKind::MutatingVerb,
                    ..
                })
            ));
        }
        other => panic!("expected a validation rejection, got {:?}", other),
    }
    assert!(err.is_user_correctable());
    assert!(gateway.executed().is_empty());
}

#[tokio::test]
async fn test_empty_question_rejected_before_generation() {
    let generator = Arc::new(StubGenerator::replying("SELECT 1"));
    let gateway = Arc::new(StubGateway::new());
    let pipeline = pipeline(
        StaticMetadataProvider::new(schema()),
        generator.clone(),
        gateway.clone(),
    );

    let err = pipeline.run("  \t").await.unwrap_err();

    assert!(matches!(err, PipelineError::EmptyQuestion));
    assert!(generator.contexts().is_empty());
    assert!(gateway.executed().is_empty());
}

#[tokio::test]
async fn test_generation_failure() {
    let gateway = Arc::new(StubGateway::new());
    let pipeline = pipeline(
        StaticMetadataProvider::new(schema()),
        Arc::new(StubGenerator::failing()),
        gateway.clone(),
    );

    let err = pipeline.run("count orders").await.unwrap_err();

    assert!(matches!(err, PipelineError::GenerationFailed(_)));
    assert!(!err.is_user_correctable());
    assert!(gateway.executed().is_empty());
}

#[tokio::test]
async fn test_database_failure_is_not_user_correctable() {
    let gateway = Arc::new(StubGateway::failing());
    let pipeline = pipeline(
        StaticMetadataProvider::new(schema()),
        Arc::new(StubGenerator::replying("SELECT COUNT(*) FROM orders")),
        gateway.clone(),
    );

    let err = pipeline.run("count orders").await.unwrap_err();

    assert!(matches!(err, PipelineError::ExecutionFailed(_)));
    assert!(!err.is_user_correctable());
    assert_eq!(gateway.executed().len(), 1);
}

#[tokio::test]
async fn test_generate_only_does_not_execute() {
    let gateway = Arc::new(StubGateway::new());
    let pipeline = pipeline(
        StaticMetadataProvider::new(schema()),
        Arc::new(StubGenerator::replying("SELECT COUNT(*) FROM orders")),
        gateway.clone(),
    );

    let outcome = pipeline.generate_only("count orders").await.unwrap();

    assert_eq!(outcome.sql, "SELECT COUNT(*) FROM orders");
    assert!(outcome.result.is_none());
    assert!(gateway.executed().is_empty());
}

#[tokio::test]
async fn test_unavailable_schema_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(StubGenerator::replying("SHOW TABLES"));
    let pipeline = pipeline(
        StaticMetadataProvider::from_file(dir.path().join("missing.json")),
        generator.clone(),
        Arc::new(StubGateway::new()),
    );

    let outcome = pipeline.run("count orders").await.unwrap();

    assert!(outcome.degraded);
    assert!(outcome.relevant_tables.is_empty());
    assert_eq!(outcome.context_elements_used, 0);
    assert_eq!(generator.contexts(), vec![String::new()]);
}

#[tokio::test]
async fn test_full_schema_mode_sends_every_table() {
    let generator = Arc::new(StubGenerator::replying("SELECT COUNT(*) FROM orders"));
    let gateway = Arc::new(StubGateway::new());
    let pipeline = pipeline(
        StaticMetadataProvider::new(schema()),
        generator.clone(),
        gateway.clone(),
    );

    let outcome = pipeline
        .answer("count orders", ContextMode::FullSchema, false)
        .await
        .unwrap();

    assert_eq!(
        generator.contexts(),
        vec!["Table: users\nColumns:\n  - id (UInt64)\n  - email (String)\n\n\n\
              Table: orders\nColumns:\n  - id (UInt64)\n  - amount (Float64)\n"
            .to_string()]
    );
    assert_eq!(outcome.relevant_tables, vec!["users".to_string(), "orders".to_string()]);
    assert_eq!(outcome.context_elements_used, 0);
    assert!(outcome.similarity_scores.is_empty());
    assert!(!outcome.degraded);
    assert!(outcome.result.is_none());
    assert!(gateway.executed().is_empty());
}

#[tokio::test]
async fn test_supplied_sql_is_validated_then_executed() {
    let gateway = Arc::new(StubGateway::new());
    let pipeline = pipeline(
        StaticMetadataProvider::new(schema()),
        Arc::new(StubGenerator::replying("SELECT 1")),
        gateway.clone(),
    );

    let mut params = Parameters::new();
    params.insert("min".into(), json!(10));
    let result = pipeline
        .execute_sql("SELECT COUNT(*) FROM orders WHERE amount > {min:Float64}", &params)
        .await
        .unwrap();
    assert_eq!(result.rows, vec![vec![json!(42)]]);

    let err = pipeline
        .execute_sql("DELETE FROM orders WHERE 1", &Parameters::new())
        .await
        .unwrap_err();
    assert!(err.is_user_correctable());
    assert!(matches!(err, PipelineError::ValidationRejected(_)));
    assert_eq!(gateway.executed().len(), 1);
}

#[tokio::test]
async fn test_execute_validated_without_a_pipeline() {
    let gateway = StubGateway::new();
    let validator = SqlValidator::default();

    let result = execute_validated(&validator, &gateway, "SELECT 1", &Parameters::new())
        .await
        .unwrap();
    assert_eq!(result.rows, vec![vec![json!(42)]]);

    let err = execute_validated(&validator, &gateway, "DROP TABLE orders", &Parameters::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ValidationRejected(_)));
    assert_eq!(gateway.executed(), vec!["SELECT 1".to_string()]);
}
