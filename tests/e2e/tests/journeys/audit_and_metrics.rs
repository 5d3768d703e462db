//! Journey: writes and structural changes are auditable after the fact, and
//! system health metrics reflect the current state of the store.

use mneme_core::audit::{AuditLog, LogEntry, Metrics};
use mneme_core::storage::Storage;
use mneme_e2e_tests::mocks::TestDataFactory;
use tempfile::tempdir;

#[test]
fn a_logged_operation_shows_up_in_recent_history() {
    let dir = tempdir().unwrap();
    let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
    let entity_id = TestDataFactory::create_entity(&storage, "Acme Corp", "organization");
    let log = AuditLog::new(&storage);

    log.log(LogEntry { operation: "entity_created", entity_id: Some(entity_id), user_initiated: true, ..Default::default() }).unwrap();

    let recent = log.get_recent(10, None, None).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].get("operation").and_then(|v| v.as_str()), Some("entity_created"));
}

#[test]
fn system_health_counts_entities_memories_and_orphans() {
    let dir = tempdir().unwrap();
    let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
    let person_id = TestDataFactory::create_entity(&storage, "Sarah", "person");
    let linked = TestDataFactory::create_fact(&storage, "Sarah joined the team in March");
    TestDataFactory::link_memory_to_entity(&storage, linked, person_id);
    TestDataFactory::create_fact(&storage, "An orphaned fact with no entity links");

    let metrics = Metrics::new(&storage);
    let health = metrics.collect_system_health().unwrap();

    assert_eq!(health.entities_total, 1);
    assert_eq!(health.memories_total, 2);
    assert_eq!(health.orphan_memories, 1);
}

#[test]
fn collect_and_store_persists_headline_metrics_that_get_trend_can_read_back() {
    let dir = tempdir().unwrap();
    let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
    TestDataFactory::create_batch(&storage, 3);
    let metrics = Metrics::new(&storage);

    metrics.collect_and_store().unwrap();

    let trend = metrics.get_trend("memories_total", 7).unwrap();
    assert_eq!(trend.len(), 1);
    assert_eq!(trend[0].get("metric_value").and_then(|v| v.as_f64()), Some(3.0));
}
