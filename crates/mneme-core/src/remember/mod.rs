//! Write path: ingesting facts and commitments, corrections, invalidation,
//! and turn buffering for crash-recoverable sessions.

use crate::audit::{AuditLog, LogEntry};
use crate::embeddings::Embedder;
use crate::extract::content_hash;
use crate::guards::validate_memory;
use crate::storage::{Record, Storage, StorageError};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, thiserror::Error)]
pub enum RememberError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("audit error: {0}")]
    Audit(#[from] crate::audit::AuditError),
}

pub type Result<T> = std::result::Result<T, RememberError>;

const DEFAULT_INVALIDATION_REASON: &str = "User requested invalidation";

/// Ingests a new fact/commitment/observation: guards, dedupes by
/// `content_hash`, inserts, links it to `entities`, tries to embed it, and
/// appends an audit entry. A live memory with the same hash has its
/// `access_count` and `updated_at` refreshed instead of being re-inserted,
/// but newly declared entities are still linked and the access is still
/// audited. `embedder` is `None` when the caller has no embedding host
/// configured; the memory is then stored without a vector rather than
/// failing the write.
pub fn remember_fact(
    storage: &Storage,
    content: &str,
    memory_type: &str,
    importance: f64,
    source_channel: Option<&str>,
    entities: &[i64],
    embedder: Option<&Embedder>,
) -> Result<i64> {
    let validation = validate_memory(content, memory_type, importance);
    let content = validation
        .adjustments
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or(content);
    let importance = validation.adjustments.get("importance").and_then(|v| v.as_f64()).unwrap_or(importance);

    let hash = content_hash(content);
    let audit = AuditLog::new(storage);
    if let Some(existing) = storage.get_one(
        "memories",
        "content_hash = ?1 AND invalidated_at IS NULL",
        &[SqlValue::Text(hash.clone())],
    )? {
        let id = existing.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
        let access_count = existing.get("access_count").and_then(|v| v.as_i64()).unwrap_or(0);
        let mut values = Record::new();
        values.insert("access_count".to_string(), serde_json::json!(access_count + 1));
        values.insert("updated_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
        storage.update("memories", &values, "id = ?", &[SqlValue::Integer(id)])?;
        link_entities(storage, id, entities)?;
        audit.log(LogEntry {
            operation: "memory_access_bumped",
            memory_id: Some(id),
            details: Some(serde_json::json!({"content_hash": hash})),
            ..Default::default()
        })?;
        return Ok(id);
    }

    let mut values = Record::new();
    values.insert("content".to_string(), serde_json::json!(content));
    values.insert("content_hash".to_string(), serde_json::json!(hash));
    values.insert("type".to_string(), serde_json::json!(memory_type));
    values.insert("importance".to_string(), serde_json::json!(importance));
    if let Some(channel) = source_channel {
        values.insert("source_channel".to_string(), serde_json::json!(channel));
    }
    let id = storage.insert("memories", &values)?;

    link_entities(storage, id, entities)?;
    embed_and_store(storage, embedder, id, content);

    audit.log(LogEntry {
        operation: "memory_remembered",
        memory_id: Some(id),
        details: Some(serde_json::json!({"type": memory_type, "entities": entities})),
        ..Default::default()
    })?;

    Ok(id)
}

/// Inserts `memory_entities` rows for any of `entities` not already linked
/// to `memory_id`. Safe to call on both the insert and the dedup-bump path.
fn link_entities(storage: &Storage, memory_id: i64, entities: &[i64]) -> Result<()> {
    if entities.is_empty() {
        return Ok(());
    }
    let existing = storage.query("memory_entities", Some("memory_id = ?1"), &[SqlValue::Integer(memory_id)], None, None)?;
    let already_linked: HashSet<i64> = existing.iter().filter_map(|row| row.get("entity_id").and_then(|v| v.as_i64())).collect();

    for &entity_id in entities {
        if already_linked.contains(&entity_id) {
            continue;
        }
        let mut values = Record::new();
        values.insert("memory_id".to_string(), serde_json::json!(memory_id));
        values.insert("entity_id".to_string(), serde_json::json!(entity_id));
        storage.insert("memory_entities", &values)?;
    }
    Ok(())
}

/// Best-effort: a missing embedder or a failed embedding call leaves the
/// memory stored without a vector rather than failing the write, matching
/// the embedding host's own degrade-gracefully contract.
fn embed_and_store(storage: &Storage, embedder: Option<&Embedder>, memory_id: i64, content: &str) {
    let Some(embedder) = embedder else { return };
    match embedder.embed_sync(content) {
        Ok(vector) => {
            let mut values = Record::new();
            values.insert("embedding".to_string(), serde_json::json!(vector));
            if let Err(error) = storage.update("memories", &values, "id = ?", &[SqlValue::Integer(memory_id)]) {
                tracing::warn!(%error, memory_id, "failed to store embedding");
            }
        }
        Err(error) => {
            tracing::warn!(%error, memory_id, "embedding generation failed; memory stored without a vector");
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionResult {
    pub success: bool,
    pub error: Option<String>,
}

/// Replaces `content`, keeping only the most recent previous content in
/// `corrected_from` -- a chain of corrections is not retained beyond one step.
pub fn correct_memory(storage: &Storage, memory_id: i64, new_content: &str, reason: Option<&str>) -> Result<CorrectionResult> {
    let Some(existing) = storage.get_one("memories", "id = ?1", &[SqlValue::Integer(memory_id)])? else {
        return Ok(CorrectionResult { success: false, error: Some(format!("memory {} not found", memory_id)) });
    };
    let previous_content = existing.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();

    let mut values = Record::new();
    values.insert("content".to_string(), serde_json::json!(new_content));
    values.insert("content_hash".to_string(), serde_json::json!(content_hash(new_content)));
    values.insert("corrected_from".to_string(), serde_json::json!(previous_content));
    values.insert("corrected_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
    values.insert("updated_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
    storage.update("memories", &values, "id = ?", &[SqlValue::Integer(memory_id)])?;

    AuditLog::new(storage).log(LogEntry {
        operation: "memory_corrected",
        memory_id: Some(memory_id),
        user_initiated: true,
        details: Some(serde_json::json!({"previous_content": previous_content, "reason": reason})),
        ..Default::default()
    })?;

    Ok(CorrectionResult { success: true, error: None })
}

/// Soft-deletes a memory: content is preserved, only `invalidated_at` and
/// `invalidated_reason` are set, so recall's `invalidated_at IS NULL` filter
/// excludes it going forward.
pub fn invalidate_memory(storage: &Storage, memory_id: i64, reason: Option<&str>) -> Result<CorrectionResult> {
    let exists = storage.get_one("memories", "id = ?1", &[SqlValue::Integer(memory_id)])?.is_some();
    if !exists {
        return Ok(CorrectionResult { success: false, error: Some(format!("memory {} not found", memory_id)) });
    }

    let mut values = Record::new();
    values.insert("invalidated_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
    values.insert("invalidated_reason".to_string(), serde_json::json!(reason.unwrap_or(DEFAULT_INVALIDATION_REASON)));
    values.insert("updated_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
    storage.update("memories", &values, "id = ?", &[SqlValue::Integer(memory_id)])?;

    AuditLog::new(storage).log(LogEntry {
        operation: "memory_invalidated",
        memory_id: Some(memory_id),
        user_initiated: true,
        details: Some(serde_json::json!({"reason": reason.unwrap_or(DEFAULT_INVALIDATION_REASON)})),
        ..Default::default()
    })?;

    Ok(CorrectionResult { success: true, error: None })
}

#[derive(Debug, Clone, Serialize)]
pub struct BufferedTurn {
    pub episode_id: i64,
    pub turn_number: i64,
}

/// Appends a turn to `episode_id`, or starts a new episode if it's missing
/// or unknown. No embedding is generated here; turns stay opaque until
/// `end_session` finalizes and summarizes them.
pub fn buffer_turn(
    storage: &Storage,
    user_content: Option<&str>,
    assistant_content: Option<&str>,
    episode_id: Option<i64>,
    session_id: Option<&str>,
) -> Result<BufferedTurn> {
    let episode = match episode_id {
        Some(id) => storage.get_one("episodes", "id = ?1", &[SqlValue::Integer(id)])?,
        None => None,
    };

    let (episode_id, turn_count) = match episode {
        Some(row) => {
            let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            let count = row.get("turn_count").and_then(|v| v.as_i64()).unwrap_or(0);
            (id, count)
        }
        None => {
            let mut values = Record::new();
            if let Some(sid) = session_id {
                values.insert("session_id".to_string(), serde_json::json!(sid));
            }
            let id = storage.insert("episodes", &values)?;
            (id, 0)
        }
    };

    let turn_number = turn_count + 1;
    let mut turn_values = Record::new();
    turn_values.insert("episode_id".to_string(), serde_json::json!(episode_id));
    turn_values.insert("turn_number".to_string(), serde_json::json!(turn_number));
    if let Some(content) = user_content {
        turn_values.insert("user_content".to_string(), serde_json::json!(content));
    }
    if let Some(content) = assistant_content {
        turn_values.insert("assistant_content".to_string(), serde_json::json!(content));
    }
    storage.insert("turn_buffer", &turn_values)?;

    let mut episode_values = Record::new();
    episode_values.insert("turn_count".to_string(), serde_json::json!(turn_number));
    storage.update("episodes", &episode_values, "id = ?", &[SqlValue::Integer(episode_id)])?;

    AuditLog::new(storage).log(LogEntry {
        operation: "turn_buffered",
        session_id,
        details: Some(serde_json::json!({"episode_id": episode_id, "turn_number": turn_number})),
        ..Default::default()
    })?;

    Ok(BufferedTurn { episode_id, turn_number })
}

#[derive(Debug, Clone, Serialize)]
pub struct EndSessionResult {
    pub episode_id: i64,
    pub narrative_stored: bool,
    pub error: Option<String>,
}

pub fn end_session(storage: &Storage, episode_id: i64, narrative: Option<&str>) -> Result<EndSessionResult> {
    let exists = storage.get_one("episodes", "id = ?1", &[SqlValue::Integer(episode_id)])?.is_some();
    if !exists {
        return Ok(EndSessionResult {
            episode_id,
            narrative_stored: false,
            error: Some(format!("episode {} not found", episode_id)),
        });
    }

    let mut values = Record::new();
    values.insert("ended_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
    values.insert("is_summarized".to_string(), serde_json::json!(true));
    if let Some(text) = narrative {
        values.insert("narrative".to_string(), serde_json::json!(text));
    }
    storage.update("episodes", &values, "id = ?", &[SqlValue::Integer(episode_id)])?;

    AuditLog::new(storage).log(LogEntry {
        operation: "session_ended",
        details: Some(serde_json::json!({"episode_id": episode_id, "narrative_stored": narrative.is_some()})),
        ..Default::default()
    })?;

    Ok(EndSessionResult { episode_id, narrative_stored: true, error: None })
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnContent {
    pub user: Option<String>,
    pub assistant: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnsummarizedEpisode {
    pub episode_id: i64,
    pub turn_count: i64,
    pub turns: Vec<TurnContent>,
}

/// The crash-recovery surface: every episode left with `is_summarized=0`,
/// its turns in order, so a restarted daemon (or operator) can finish
/// summarizing sessions interrupted by an unclean shutdown.
pub fn get_unsummarized_turns(storage: &Storage) -> Result<Vec<UnsummarizedEpisode>> {
    let episodes = storage.query("episodes", Some("is_summarized = 0"), &[], None, None)?;
    let mut out = Vec::new();
    for episode in episodes {
        let episode_id = episode.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
        let turn_count = episode.get("turn_count").and_then(|v| v.as_i64()).unwrap_or(0);
        let turn_rows = storage.query(
            "turn_buffer",
            Some("episode_id = ?1"),
            &[SqlValue::Integer(episode_id)],
            Some("turn_number ASC"),
            None,
        )?;
        let turns = turn_rows
            .into_iter()
            .map(|row| TurnContent {
                user: row.get("user_content").and_then(|v| v.as_str()).map(|s| s.to_string()),
                assistant: row.get("assistant_content").and_then(|v| v.as_str()).map(|s| s.to_string()),
            })
            .collect();
        out.push(UnsummarizedEpisode { episode_id, turn_count, turns });
    }
    Ok(out)
}
