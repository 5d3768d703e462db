//! Test database manager.
//!
//! Provides isolated database instances for end-to-end tests: temporary
//! databases that are cleaned up automatically, and a few seeding helpers
//! for the common "N memories already exist" starting point.

use mneme_core::storage::Storage;
use std::path::PathBuf;
use tempfile::TempDir;

/// Creates an isolated `Storage` per test to prevent cross-test interference.
/// The backing directory is deleted when the manager is dropped.
pub struct TestDatabaseManager {
    pub storage: Storage,
    _temp_dir: TempDir,
    db_path: PathBuf,
}

impl TestDatabaseManager {
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let db_path = temp_dir.path().join("test_mneme.db");
        let storage = Storage::new(Some(db_path.clone())).expect("failed to create test storage");

        Self { storage, _temp_dir: temp_dir, db_path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn memory_count(&self) -> i64 {
        self.storage
            .query("memories", Some("invalidated_at IS NULL"), &[], None, None)
            .map(|rows| rows.len() as i64)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.memory_count() == 0
    }

    /// Seeds `count` plain facts with ascending, distinct content.
    pub fn seed_facts(&mut self, count: usize) -> Vec<i64> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let id = mneme_core::remember::remember_fact(&self.storage, &format!("Test fact number {i}"), "fact", 0.5, None, &[], None)
                .expect("remember_fact failed");
            ids.push(id);
        }
        ids
    }

    /// Seeds one entity and returns its id.
    pub fn seed_entity(&self, name: &str, entity_type: &str) -> i64 {
        self.storage
            .insert("entities", &mneme_core::record! {"name" => name, "canonical_name" => name.to_lowercase(), "type" => entity_type})
            .expect("entity insert failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_database_starts_empty_and_exists_on_disk() {
        let db = TestDatabaseManager::new_temp();
        assert!(db.is_empty());
        assert!(db.path().exists());
    }

    #[test]
    fn seed_facts_inserts_the_requested_count() {
        let mut db = TestDatabaseManager::new_temp();
        let ids = db.seed_facts(10);

        assert_eq!(ids.len(), 10);
        assert_eq!(db.memory_count(), 10);
    }
}
