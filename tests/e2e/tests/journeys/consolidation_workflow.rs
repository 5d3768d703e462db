//! Journey: a full consolidation pass runs every phase and reports how many
//! rows each one touched.

use mneme_core::config::MemoryConfig;
use mneme_core::consolidate::ConsolidateService;
use mneme_core::storage::Storage;
use mneme_e2e_tests::mocks::TestDataFactory;
use std::sync::Arc;
use tempfile::tempdir;

fn service() -> (ConsolidateService, Arc<Storage>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let storage = Arc::new(Storage::new(Some(dir.path().join("t.db"))).unwrap());
    let config = Arc::new(MemoryConfig::default());
    (ConsolidateService::new(storage.clone(), config), storage, dir)
}

#[test]
fn full_consolidation_decays_importance_of_existing_memories() {
    let (service, storage, _dir) = service();
    let memory_id = TestDataFactory::create_fact(&storage, "A fact that will decay over time");
    let before = storage
        .get_one("memories", "id = ?1", &[rusqlite::types::Value::Integer(memory_id)])
        .unwrap()
        .unwrap()
        .get("importance")
        .and_then(|v| v.as_f64())
        .unwrap();

    let summary = service.run_full_consolidation().unwrap();

    let after = storage
        .get_one("memories", "id = ?1", &[rusqlite::types::Value::Integer(memory_id)])
        .unwrap()
        .unwrap()
        .get("importance")
        .and_then(|v| v.as_f64())
        .unwrap();

    assert!(after <= before);
    assert_eq!(summary.decayed, 1);
}

#[test]
fn near_duplicate_memories_are_merged_during_consolidation() {
    let (service, storage, _dir) = service();
    let a = TestDataFactory::create_fact(&storage, "The quarterly report is due Friday");
    let b = TestDataFactory::create_fact(&storage, "The quarterly report is due Friday.");
    // Near-identical embeddings: what `merge_similar_memories` actually keys on.
    let mut values = mneme_core::storage::Record::new();
    values.insert("embedding".to_string(), serde_json::json!(vec![0.1_f32; 8]));
    storage.update("memories", &values, "id = ?", &[rusqlite::types::Value::Integer(a)]).unwrap();
    let mut values = mneme_core::storage::Record::new();
    values.insert("embedding".to_string(), serde_json::json!(vec![0.1000001_f32; 8]));
    storage.update("memories", &values, "id = ?", &[rusqlite::types::Value::Integer(b)]).unwrap();

    let summary = service.run_full_consolidation().unwrap();

    assert_eq!(summary.merged, 1);
}
