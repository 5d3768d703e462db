//! Journey: remember a handful of facts, then recall them back by content
//! and by linked entity.

use mneme_core::config::MemoryConfig;
use mneme_core::recall::{recall, recall_about, RecallFilters};
use mneme_e2e_tests::harness::TestDatabaseManager;
use mneme_e2e_tests::mocks::TestDataFactory;

#[test]
fn remembered_facts_are_recallable_by_keyword() {
    let db = TestDatabaseManager::new_temp();
    TestDataFactory::create_fact(&db.storage, "Rust's ownership model prevents data races at compile time");
    TestDataFactory::create_fact(&db.storage, "Chocolate cake needs cocoa powder and eggs");
    let config = MemoryConfig::default();

    let results = recall(&db.storage, &config, "ownership data races", None, None, &RecallFilters::default(), Some(10)).unwrap();

    assert!(!results.is_empty());
    assert!(results[0].content.contains("ownership"));
}

#[test]
fn recall_about_returns_only_memories_linked_to_the_named_entity() {
    let db = TestDatabaseManager::new_temp();
    let sarah_id = db.seed_entity("Sarah", "person");
    let memory_id = TestDataFactory::create_fact(&db.storage, "Sarah prefers async standups over sync ones");
    TestDataFactory::link_memory_to_entity(&db.storage, memory_id, sarah_id);
    TestDataFactory::create_fact(&db.storage, "Unrelated fact about the weather");

    let results = recall_about(&db.storage, "Sarah", 10).unwrap();

    assert_eq!(results.len(), 1);
    assert!(results[0].content.contains("async standups"));
}

#[test]
fn low_importance_memories_are_excluded_unless_requested() {
    let db = TestDatabaseManager::new_temp();
    let _ = mneme_core::remember::remember_fact(&db.storage, "Barely-important trivia", "fact", 0.0, None, &[], None).unwrap();
    let config = MemoryConfig::default();

    let filtered = recall(&db.storage, &config, "trivia", None, None, &RecallFilters::default(), Some(10)).unwrap();
    assert!(filtered.is_empty());

    let mut filters = RecallFilters::default();
    filters.include_low_importance = true;
    let unfiltered = recall(&db.storage, &config, "trivia", None, None, &filters, Some(10)).unwrap();
    assert_eq!(unfiltered.len(), 1);
}
