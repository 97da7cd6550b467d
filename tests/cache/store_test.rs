use std::sync::Arc;

use quarry::cache::{CacheSnapshot, EmbeddingStore, JsonFileStore, SqliteStore, StoreError};
use quarry::embedding::{EmbeddingIndex, HashingEmbedder};

fn snapshot() -> CacheSnapshot {
    let mut snapshot = CacheSnapshot::default();
    snapshot
        .text_to_id
        .insert("Table orders with columns: id, amount".into(), "emb_0".into());
    snapshot
        .text_to_id
        .insert("Column amount in table orders of type Float64".into(), "emb_1".into());
    snapshot.embeddings.insert("emb_0".into(), vec![0.6, 0.8]);
    snapshot.embeddings.insert("emb_1".into(), vec![1.0, 0.0]);
    snapshot
}

#[test]
fn test_sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache").join("embeddings.db");

    SqliteStore::open(&path).unwrap().save(&snapshot()).unwrap();

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(reopened.load().unwrap(), Some(snapshot()));
    assert_eq!(reopened.location(), path.display().to_string());
}

#[test]
fn test_sqlite_store_overwrites() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.save(&snapshot()).unwrap();
    store.save(&CacheSnapshot::default()).unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn test_json_store_preserves_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("embeddings.json"));
    store.save(&snapshot()).unwrap();

    let loaded = store.load().unwrap().unwrap();
    let texts: Vec<&str> = loaded.text_to_id.keys().map(String::as_str).collect();
    assert_eq!(
        texts,
        vec![
            "Table orders with columns: id, amount",
            "Column amount in table orders of type Float64"
        ]
    );
}

#[test]
fn test_json_store_rejects_other_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("embeddings.json");
    std::fs::write(&path, r#"{"version": 99, "text_to_id": {}, "embeddings": {}}"#).unwrap();

    let store = JsonFileStore::new(&path);
    assert!(matches!(
        store.load(),
        Err(StoreError::VersionMismatch {
            found: 99,
            expected: 1
        })
    ));
}

#[test]
fn test_index_round_trip_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("embeddings.db");
    let model = Arc::new(HashingEmbedder::new(32).unwrap());

    {
        let index = EmbeddingIndex::open(model.clone(), Arc::new(SqliteStore::open(&path).unwrap()));
        index.embed_batch(&["Table users", "Column id in table users of type UInt64"]).unwrap();
        index.save().unwrap();
    }

    let index = EmbeddingIndex::open(model, Arc::new(SqliteStore::open(&path).unwrap()));
    assert_eq!(index.len(), 2);
    assert!(index.contains("Table users"));
    assert_eq!(index.record("Column id in table users of type UInt64").unwrap().id, "emb_1");
}
