//! Journey: deterministic verification flags commitments with no detectable
//! deadline and verifies everything else, once memories clear the
//! just-written grace buffer.

use chrono::{Duration, Utc};
use mneme_core::config::MemoryConfig;
use mneme_core::storage::{Record, Storage};
use mneme_core::verify::run_verification;
use mneme_e2e_tests::mocks::TestDataFactory;
use rusqlite::types::Value as SqlValue;
use tempfile::tempdir;

fn age_past_buffer(storage: &Storage, memory_id: i64) {
    let mut values = Record::new();
    values.insert("created_at".to_string(), serde_json::json!((Utc::now() - Duration::minutes(10)).to_rfc3339()));
    storage.update("memories", &values, "id = ?", &[SqlValue::Integer(memory_id)]).unwrap();
}

#[test]
fn commitment_without_a_deadline_phrase_is_flagged() {
    let dir = tempdir().unwrap();
    let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
    let config = MemoryConfig::default();
    let id = TestDataFactory::create_commitment_without_deadline(&storage, "I will follow up with the vendor");
    age_past_buffer(&storage, id);

    let outcome = run_verification(&storage, &config).unwrap();

    assert_eq!(outcome.flagged, 1);
    assert_eq!(outcome.verified, 0);
    let row = storage.get_one("memories", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
    assert_eq!(row.get("verification_status").and_then(|v| v.as_str()), Some("flagged"));
    assert!(row.get("importance").and_then(|v| v.as_f64()).unwrap() <= 0.1);
}

#[test]
fn commitment_with_a_deadline_phrase_is_verified() {
    let dir = tempdir().unwrap();
    let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
    let config = MemoryConfig::default();
    let id = TestDataFactory::create_commitment_with_deadline(&storage, "I will follow up with the vendor by Friday");
    age_past_buffer(&storage, id);

    let outcome = run_verification(&storage, &config).unwrap();

    assert_eq!(outcome.verified, 1);
    let row = storage.get_one("memories", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
    assert_eq!(row.get("verification_status").and_then(|v| v.as_str()), Some("verified"));
}

#[test]
fn memories_still_inside_the_grace_buffer_are_untouched() {
    let dir = tempdir().unwrap();
    let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
    let config = MemoryConfig::default();
    TestDataFactory::create_commitment_without_deadline(&storage, "I will follow up with the vendor");

    let outcome = run_verification(&storage, &config).unwrap();

    assert_eq!(outcome.verified + outcome.flagged, 0);
}
