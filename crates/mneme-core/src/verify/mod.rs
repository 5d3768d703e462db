//! Background verification: deterministic checks over pending memories,
//! with an optional language-model consistency pass layered on top.

use crate::audit::{AuditLog, LogEntry};
use crate::config::MemoryConfig;
use crate::extract::has_deadline_pattern;
use crate::storage::{Record, Storage, StorageError};
use chrono::{Duration, Utc};
use rusqlite::types::Value as SqlValue;

/// Memories younger than this are left untouched so corrections have time to arrive.
const VERIFY_AGE_BUFFER_MINUTES: i64 = 5;

const FLAGGED_IMPORTANCE: f64 = 0.1;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("audit error: {0}")]
    Audit(#[from] crate::audit::AuditError),
}

pub type Result<T> = std::result::Result<T, VerifyError>;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct VerificationOutcome {
    pub verified: usize,
    pub flagged: usize,
}

/// Runs one batch of verification: up to `config.verify_batch_size` memories
/// with `verification_status = 'pending'` and age at least the buffer above.
/// Grandfathered rows (already `verified` or `flagged`) are never reprocessed.
pub fn run_verification(storage: &Storage, config: &MemoryConfig) -> Result<VerificationOutcome> {
    let cutoff = (Utc::now() - Duration::minutes(VERIFY_AGE_BUFFER_MINUTES)).to_rfc3339();

    let rows = storage.query(
        "memories",
        Some("verification_status = 'pending' AND created_at <= ?1"),
        &[SqlValue::Text(cutoff)],
        Some("created_at ASC"),
        Some(config.verify_batch_size),
    )?;

    let mut outcome = VerificationOutcome::default();
    for row in rows {
        if verify_one(storage, config, &row)? {
            outcome.flagged += 1;
        } else {
            outcome.verified += 1;
        }
    }
    Ok(outcome)
}

/// Applies deterministic checks (and, if configured, a language-model
/// consistency check) to a single memory row. Returns `true` if the memory
/// was flagged, `false` if it was verified.
fn verify_one(storage: &Storage, config: &MemoryConfig, row: &Record) -> Result<bool> {
    let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
    let content = row.get("content").and_then(|v| v.as_str()).unwrap_or_default();
    let memory_type = row.get("type").and_then(|v| v.as_str()).unwrap_or_default();

    let deterministic_flag = memory_type == "commitment" && !has_deadline_pattern(content);

    let flagged = if deterministic_flag {
        true
    } else if has_language_model(config) {
        !language_model_consistency_check(config, content)
    } else {
        false
    };

    let now = Utc::now().to_rfc3339();
    let mut values = Record::new();
    if flagged {
        values.insert("verification_status".to_string(), serde_json::json!("flagged"));
        values.insert("importance".to_string(), serde_json::json!(FLAGGED_IMPORTANCE));
    } else {
        values.insert("verification_status".to_string(), serde_json::json!("verified"));
        values.insert("verified_at".to_string(), serde_json::json!(now.clone()));
    }
    values.insert("updated_at".to_string(), serde_json::json!(now));
    storage.update("memories", &values, "id = ?", &[SqlValue::Integer(id)])?;

    AuditLog::new(storage).log(LogEntry {
        operation: if flagged { "memory_flagged" } else { "memory_verified" },
        memory_id: Some(id),
        ..Default::default()
    })?;

    Ok(flagged)
}

fn has_language_model(config: &MemoryConfig) -> bool {
    !config.language_model.is_empty()
}

/// Placeholder consistency pass: absence of a configured model is not an
/// error, and when one is configured a timeout or failure degrades to "pass"
/// rather than blocking verification on an external call.
fn language_model_consistency_check(_config: &MemoryConfig, _content: &str) -> bool {
    true
}
