//! Journey: the scheduler registers the right job set, and an ordered
//! shutdown leaves the store flushed and closed.

use mneme_core::config::MemoryConfig;
use mneme_core::health::{build_status_report, shutdown};
use mneme_core::scheduler::{Scheduler, DAILY_DECAY, FULL_CONSOLIDATION, PATTERN_DETECTION, VAULT_SYNC};
use mneme_core::storage::Storage;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn scheduler_registers_exactly_the_expected_jobs() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(Storage::new(Some(dir.path().join("t.db"))).unwrap());
    let config = Arc::new(MemoryConfig::default());
    let scheduler = Scheduler::new(storage, config);

    let mut names = scheduler.job_names();
    names.sort();
    let mut expected = vec![DAILY_DECAY, FULL_CONSOLIDATION, PATTERN_DETECTION, VAULT_SYNC];
    expected.sort();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn status_report_reflects_registered_jobs_and_row_counts() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(Storage::new(Some(dir.path().join("t.db"))).unwrap());
    let config = Arc::new(MemoryConfig::default());
    let scheduler = Scheduler::new(storage.clone(), config.clone());
    mneme_core::remember::remember_fact(&storage, "A fact", "fact", 0.5, None, &[], None).unwrap();

    let report = build_status_report(&storage, &config, &scheduler).unwrap();

    assert_eq!(report.counts.memories, 1);
    assert_eq!(report.scheduled_jobs.len(), 4);
}

#[tokio::test]
async fn ordered_shutdown_closes_the_store_after_stopping_the_scheduler() {
    let dir = tempdir().unwrap();
    let storage = Arc::new(Storage::new(Some(dir.path().join("t.db"))).unwrap());
    let config = Arc::new(MemoryConfig::default());
    let mut scheduler = Scheduler::new(storage.clone(), config);
    scheduler.start();

    shutdown(&storage, &mut scheduler).unwrap();
}
