//! Test data factory.
//!
//! Generates realistic memories and entities for journey tests, including
//! the handful of shapes that exercise specific downstream behavior:
//! commitments with and without a detectable deadline, and entities with
//! linked memories for graph-proximity tests.

use mneme_core::remember::remember_fact;
use mneme_core::storage::{Record, Storage};

pub struct TestDataFactory;

impl TestDataFactory {
    /// Inserts a plain fact and returns its id.
    pub fn create_fact(storage: &Storage, content: &str) -> i64 {
        remember_fact(storage, content, "fact", 0.5, None, &[], None).expect("remember_fact failed")
    }

    /// Inserts a commitment with no recognizable deadline phrase -- this
    /// engine's deterministic verification flags these.
    pub fn create_commitment_without_deadline(storage: &Storage, content: &str) -> i64 {
        remember_fact(storage, content, "commitment", 0.5, None, &[], None).expect("remember_fact failed")
    }

    /// Inserts a commitment that does carry a deadline phrase.
    pub fn create_commitment_with_deadline(storage: &Storage, content: &str) -> i64 {
        remember_fact(storage, content, "commitment", 0.5, None, &[], None).expect("remember_fact failed")
    }

    /// Inserts `count` facts and returns their ids.
    pub fn create_batch(storage: &Storage, count: usize) -> Vec<i64> {
        (0..count).map(|i| Self::create_fact(storage, &format!("Batch fact {i}"))).collect()
    }

    /// Inserts an entity and returns its id.
    pub fn create_entity(storage: &Storage, name: &str, entity_type: &str) -> i64 {
        storage
            .insert("entities", &mneme_core::record! {"name" => name, "canonical_name" => name.to_lowercase(), "type" => entity_type})
            .expect("entity insert failed")
    }

    /// Links a memory to an entity via the join table.
    pub fn link_memory_to_entity(storage: &Storage, memory_id: i64, entity_id: i64) {
        let mut values = Record::new();
        values.insert("memory_id".to_string(), serde_json::json!(memory_id));
        values.insert("entity_id".to_string(), serde_json::json!(entity_id));
        storage.insert("memory_entities", &values).expect("memory_entities insert failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mneme_core::storage::Storage;
    use tempfile::tempdir;

    fn storage() -> (Storage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (Storage::new(Some(dir.path().join("t.db"))).unwrap(), dir)
    }

    #[test]
    fn create_batch_inserts_the_requested_count() {
        let (storage, _dir) = storage();
        let ids = TestDataFactory::create_batch(&storage, 10);
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn link_memory_to_entity_round_trips_via_query() {
        let (storage, _dir) = storage();
        let memory_id = TestDataFactory::create_fact(&storage, "Sarah prefers async standups");
        let entity_id = TestDataFactory::create_entity(&storage, "Sarah", "person");
        TestDataFactory::link_memory_to_entity(&storage, memory_id, entity_id);

        let links = storage.query("memory_entities", Some("entity_id = ?1"), &[rusqlite::types::Value::Integer(entity_id)], None, None).unwrap();
        assert_eq!(links.len(), 1);
    }
}
