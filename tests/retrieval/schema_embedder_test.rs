use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use quarry::embedding::{EmbeddingIndex, HashingEmbedder};
use quarry::metadata::{
    ColumnInfo, MetadataProvider, MetadataResult, SchemaSnapshot, StaticMetadataProvider,
    TableInfo,
};
use quarry::retrieval::{RetrievalError, SchemaElement, SchemaEmbedder};

/// Serves a fixed snapshot and counts how often it is asked.
struct CountingProvider {
    snapshot: SchemaSnapshot,
    calls: AtomicUsize,
}

#[async_trait]
impl MetadataProvider for CountingProvider {
    async fn snapshot(&self) -> MetadataResult<SchemaSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot.clone())
    }
}

fn shop_schema() -> SchemaSnapshot {
    let mut snapshot = SchemaSnapshot::new();
    snapshot.insert(
        TableInfo::new(
            "users",
            vec![
                ColumnInfo::new("id", "UInt64"),
                ColumnInfo::new("email", "String").with_samples(["a@example.com", "b@example.com"]),
                ColumnInfo::new("country", "String").with_samples(["DE", "FR", "US"]),
            ],
        )
        .with_row_count(1200),
    );
    snapshot.insert(
        TableInfo::new(
            "orders",
            vec![
                ColumnInfo::new("id", "UInt64"),
                ColumnInfo::new("user_id", "UInt64"),
                ColumnInfo::new("amount", "Float64"),
                ColumnInfo::new("status", "String").with_samples(["paid", "refunded"]),
            ],
        )
        .with_row_count(50_000),
    );
    snapshot
}

fn embedder_with(provider: Arc<dyn MetadataProvider>) -> SchemaEmbedder {
    let index = EmbeddingIndex::in_memory(Arc::new(HashingEmbedder::default()));
    SchemaEmbedder::new(provider, Arc::new(index))
}

#[tokio::test]
async fn test_embed_schema_produces_tables_then_columns() {
    let embedder = embedder_with(Arc::new(StaticMetadataProvider::new(shop_schema())));
    let elements = embedder.embed_schema().await.unwrap();

    assert_eq!(elements.len(), 9);
    assert_eq!(embedder.element_count(), 9);
    assert_eq!(
        elements[0].element.description(),
        "Table users with columns: id, email, country. \
         Sample data: email contains a@example.com, b@example.com; country contains DE, FR"
    );
    assert_eq!(
        elements[8].element.description(),
        "Column status in table orders of type String with example values: paid, refunded"
    );
    assert!(elements.iter().all(|e| e.embedding.len() == 384));
}

#[tokio::test]
async fn test_find_relevant_schema_embeds_lazily_once() {
    let provider = Arc::new(CountingProvider {
        snapshot: shop_schema(),
        calls: AtomicUsize::new(0),
    });
    let embedder = embedder_with(provider.clone());
    assert!(!embedder.is_embedded());

    embedder.find_relevant_schema("order amount", 5).await.unwrap();
    embedder.find_relevant_schema("user email", 5).await.unwrap();

    assert!(embedder.is_embedded());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_embed_schema_refetches() {
    let provider = Arc::new(CountingProvider {
        snapshot: shop_schema(),
        calls: AtomicUsize::new(0),
    });
    let embedder = embedder_with(provider.clone());

    embedder.embed_schema().await.unwrap();
    embedder.reset();
    embedder.find_relevant_schema("orders", 3).await.unwrap();

    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_matches_are_ranked_and_bounded() {
    let embedder = embedder_with(Arc::new(StaticMetadataProvider::new(shop_schema())));

    let matches = embedder.find_relevant_schema("order status", 4).await.unwrap();
    assert_eq!(matches.len(), 4);
    assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    assert!(matches.iter().all(|m| (-1.0..=1.0).contains(&m.similarity)));

    let all = embedder.find_relevant_schema("order status", 100).await.unwrap();
    assert_eq!(all.len(), 9);
}

#[tokio::test]
async fn test_exact_description_is_top_match() {
    let embedder = embedder_with(Arc::new(StaticMetadataProvider::new(shop_schema())));

    let matches = embedder
        .find_relevant_schema("Column amount in table orders of type Float64", 3)
        .await
        .unwrap();

    match &matches[0].element {
        SchemaElement::Column { table, name, .. } => {
            assert_eq!(table, "orders");
            assert_eq!(name, "amount");
        }
        other => panic!("expected a column, got {:?}", other),
    }
    assert!((matches[0].similarity - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_reads_do_not_mutate_stored_elements() {
    let embedder = embedder_with(Arc::new(StaticMetadataProvider::new(shop_schema())));

    let first = embedder.find_relevant_schema("users", 9).await.unwrap();
    let second = embedder.find_relevant_schema("users", 9).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(embedder.element_count(), 9);
}

#[tokio::test]
async fn test_provider_failure_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = embedder_with(Arc::new(StaticMetadataProvider::from_file(
        dir.path().join("missing.json"),
    )));

    let result = embedder.find_relevant_schema("anything", 5).await;
    assert!(matches!(result, Err(RetrievalError::Metadata(_))));
    assert!(!embedder.is_embedded());
}
