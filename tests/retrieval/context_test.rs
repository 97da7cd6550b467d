use std::sync::Arc;

use quarry::config::RetrievalSettings;
use quarry::embedding::{EmbeddingIndex, EmbeddingModel, EmbeddingResult, HashingEmbedder};
use quarry::metadata::{ColumnInfo, SchemaSnapshot, StaticMetadataProvider, TableInfo};
use quarry::retrieval::{
    ContextAssembler, QueryProcessor, RelevanceMatch, SchemaElement, SchemaEmbedder,
};

fn orders() -> TableInfo {
    TableInfo::new(
        "orders",
        vec![
            ColumnInfo::new("id", "UInt64"),
            ColumnInfo::new("amount", "Float64").with_samples(["19.99", "5", "120.5"]),
            ColumnInfo::new("status", "LowCardinality(String)").with_samples(["paid", "refunded"]),
        ],
    )
    .with_row_count(1_234_567)
}

fn users() -> TableInfo {
    TableInfo::new(
        "users",
        vec![
            ColumnInfo::new("id", "UInt64"),
            ColumnInfo::new("email", "String"),
        ],
    )
}

fn column(table: &TableInfo, name: &str, similarity: f32) -> RelevanceMatch {
    RelevanceMatch {
        element: SchemaElement::column(&table.name, table.column(name).unwrap()),
        similarity,
    }
}

fn table(info: &TableInfo, similarity: f32) -> RelevanceMatch {
    RelevanceMatch {
        element: SchemaElement::table(info),
        similarity,
    }
}

fn ranked_matches() -> Vec<RelevanceMatch> {
    let orders = orders();
    let users = users();
    vec![
        column(&orders, "amount", 0.912),
        table(&orders, 0.874),
        column(&users, "email", 0.61),
        column(&orders, "status", 0.5049),
        table(&users, 0.33),
    ]
}

#[test]
fn test_focused_context_snapshot() {
    let context = ContextAssembler::default().focused_context(&ranked_matches());

    insta::assert_snapshot!(context.trim_end(), @r"
    Table: orders
    Relevant columns:
      - amount (Float64) [examples: 19.99, 5] (similarity: 0.91)
      - status (LowCardinality(String)) [examples: paid, refunded] (similarity: 0.50)


    Table: users
    Relevant columns:
      - email (String) (similarity: 0.61)
    ");
}

#[test]
fn test_focused_context_is_deterministic() {
    let assembler = ContextAssembler::default();
    assert_eq!(
        assembler.focused_context(&ranked_matches()),
        assembler.focused_context(&ranked_matches())
    );
    assert_eq!(
        assembler.relevant_tables(&ranked_matches()),
        vec!["orders".to_string(), "users".to_string()]
    );
}

#[test]
fn test_full_schema_context_snapshot() {
    let mut snapshot = SchemaSnapshot::new();
    snapshot.insert(orders());
    snapshot.insert(users());

    let context = ContextAssembler::default().full_schema_context(&snapshot);

    insta::assert_snapshot!(context.trim_end(), @r"
    Table: orders (1,234,567 rows)
    Columns:
      - id (UInt64)
      - amount (Float64) [examples: 19.99, 5, 120.5]
      - status (LowCardinality(String)) [examples: paid, refunded]


    Table: users
    Columns:
      - id (UInt64)
      - email (String)
    ");
}

/// A model that always fails.
struct BrokenModel;

impl EmbeddingModel for BrokenModel {
    fn dimension(&self) -> usize {
        8
    }

    fn encode(&self, _texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Err(quarry::embedding::EmbeddingError::Model("model offline".into()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

fn processor(model: Arc<dyn EmbeddingModel>, snapshot: SchemaSnapshot, top_k: usize) -> QueryProcessor {
    let embedder = SchemaEmbedder::new(
        Arc::new(StaticMetadataProvider::new(snapshot)),
        Arc::new(EmbeddingIndex::in_memory(model)),
    );
    let settings = RetrievalSettings {
        top_k,
        ..Default::default()
    };
    QueryProcessor::with_settings(Arc::new(embedder), &settings)
}

#[tokio::test]
async fn test_process_query() {
    let mut snapshot = SchemaSnapshot::new();
    snapshot.insert(orders());
    snapshot.insert(users());
    let processor = processor(Arc::new(HashingEmbedder::default()), snapshot, 4);

    let result = processor.process_query("orders amount").await;

    assert!(!result.degraded);
    assert_eq!(result.top_matches.len(), 4);
    assert!(!result.relevant_tables.is_empty());
    assert!(result.focused_context.starts_with("Table: "));
    assert_eq!(result.top_scores(2).len(), 2);
}

#[tokio::test]
async fn test_empty_schema_is_degraded_not_an_error() {
    let processor = processor(Arc::new(HashingEmbedder::default()), SchemaSnapshot::new(), 10);

    let result = processor.process_query("anything").await;

    assert!(result.degraded);
    assert!(result.top_matches.is_empty());
    assert!(result.relevant_tables.is_empty());
    assert_eq!(result.focused_context, "");
}

#[tokio::test]
async fn test_embedding_failure_falls_back_to_full_schema() {
    let mut snapshot = SchemaSnapshot::new();
    snapshot.insert(users());
    let processor = processor(Arc::new(BrokenModel), snapshot, 10);

    let result = processor.process_query("user emails").await;

    assert!(result.degraded);
    assert!(result.top_matches.is_empty());
    assert_eq!(result.relevant_tables, vec!["users".to_string()]);
    assert_eq!(
        result.focused_context,
        "Table: users\nColumns:\n  - id (UInt64)\n  - email (String)\n"
    );
}
