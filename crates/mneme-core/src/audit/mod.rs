//! Append-only audit trail, a metrics time series, and the system-health
//! snapshot derived from both tables plus the live entity/memory counts.

use crate::storage::{Record, Storage, StorageError};
use rusqlite::types::Value as SqlValue;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, AuditError>;

/// Records mutating operations and answers chronology queries over them.
pub struct AuditLog<'a> {
    storage: &'a Storage,
}

#[derive(Debug, Default, Clone)]
pub struct LogEntry<'a> {
    pub operation: &'a str,
    pub entity_id: Option<i64>,
    pub memory_id: Option<i64>,
    pub session_id: Option<&'a str>,
    pub user_initiated: bool,
    pub details: Option<JsonValue>,
}

impl<'a> AuditLog<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Appends one entry. `details` round-trips structurally (nested
    /// objects, lists, nulls); omitted details read back as null.
    pub fn log(&self, entry: LogEntry<'_>) -> Result<i64> {
        let mut values = Record::new();
        values.insert("operation".to_string(), serde_json::json!(entry.operation));
        values.insert("entity_id".to_string(), entry.entity_id.map(|v| serde_json::json!(v)).unwrap_or(JsonValue::Null));
        values.insert("memory_id".to_string(), entry.memory_id.map(|v| serde_json::json!(v)).unwrap_or(JsonValue::Null));
        values.insert("session_id".to_string(), entry.session_id.map(|v| serde_json::json!(v)).unwrap_or(JsonValue::Null));
        values.insert("user_initiated".to_string(), serde_json::json!(entry.user_initiated));
        values.insert("details".to_string(), entry.details.unwrap_or(JsonValue::Null));
        Ok(self.storage.insert("audit_log", &values)?)
    }

    /// Newest-first, optionally filtered by exact operation and/or entity id
    /// (filters combine with AND).
    pub fn get_recent(&self, limit: usize, operation: Option<&str>, entity_id: Option<i64>) -> Result<Vec<Record>> {
        let mut clauses = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();
        if let Some(op) = operation {
            params.push(SqlValue::Text(op.to_string()));
            clauses.push(format!("operation = ?{}", params.len()));
        }
        if let Some(id) = entity_id {
            params.push(SqlValue::Integer(id));
            clauses.push(format!("entity_id = ?{}", params.len()));
        }
        let where_clause = (!clauses.is_empty()).then(|| clauses.join(" AND "));
        let rows = self.storage.query("audit_log", where_clause.as_deref(), &params, Some("id DESC"), Some(limit))?;
        Ok(rows.into_iter().map(parse_details).collect())
    }

    /// Chronological (oldest-first) entries naming this entity.
    pub fn get_entity_history(&self, entity_id: i64) -> Result<Vec<Record>> {
        let rows = self.storage.query(
            "audit_log",
            Some("entity_id = ?1"),
            &[SqlValue::Integer(entity_id)],
            Some("id ASC"),
            None,
        )?;
        Ok(rows.into_iter().map(parse_details).collect())
    }

    /// Chronological (oldest-first) entries naming this memory.
    pub fn get_memory_history(&self, memory_id: i64) -> Result<Vec<Record>> {
        let rows = self.storage.query(
            "audit_log",
            Some("memory_id = ?1"),
            &[SqlValue::Integer(memory_id)],
            Some("id ASC"),
            None,
        )?;
        Ok(rows.into_iter().map(parse_details).collect())
    }
}

/// `details` is stored as a JSON-encoded string (via `json_to_sql`'s object
/// handling); decode it back into a structured value for callers.
fn parse_details(mut row: Record) -> Record {
    if let Some(JsonValue::String(raw)) = row.get("details") {
        if let Ok(parsed) = serde_json::from_str::<JsonValue>(raw) {
            row.insert("details".to_string(), parsed);
        }
    }
    row
}

/// Records point-in-time metrics and answers trend/health queries over them.
pub struct Metrics<'a> {
    storage: &'a Storage,
}

impl<'a> Metrics<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub fn record(&self, metric_name: &str, value: f64, dimensions: Option<JsonValue>) -> Result<i64> {
        let mut values = Record::new();
        values.insert("metric_name".to_string(), serde_json::json!(metric_name));
        values.insert("metric_value".to_string(), serde_json::json!(value));
        values.insert("dimensions".to_string(), dimensions.unwrap_or(JsonValue::Null));
        Ok(self.storage.insert("metrics", &values)?)
    }

    /// Chronological rows for `metric_name` within the trailing `days`, or
    /// an empty list for an unknown metric.
    pub fn get_trend(&self, metric_name: &str, days: i64) -> Result<Vec<Record>> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(days)).to_rfc3339();
        let rows = self.storage.query(
            "metrics",
            Some("metric_name = ?1 AND timestamp >= ?2"),
            &[SqlValue::Text(metric_name.to_string()), SqlValue::Text(cutoff)],
            Some("id ASC"),
            None,
        )?;
        Ok(rows)
    }

    /// Snapshot of entity counts by type, memory statistics, and data-quality
    /// indicators (orphan memories, stale entities).
    pub fn collect_system_health(&self) -> Result<SystemHealth> {
        let entities = self.storage.query("entities", Some("deleted_at IS NULL"), &[], None, None)?;
        let mut entities_by_type: HashMap<String, i64> = HashMap::new();
        for row in &entities {
            let entity_type = row.get("type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            *entities_by_type.entry(entity_type).or_insert(0) += 1;
        }

        let memories = self.storage.query("memories", Some("invalidated_at IS NULL"), &[], None, None)?;
        let mut memories_by_type: HashMap<String, i64> = HashMap::new();
        let mut importance_sum = 0.0;
        let mut orphan_memories = 0i64;
        for row in &memories {
            let memory_type = row.get("type").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            *memories_by_type.entry(memory_type).or_insert(0) += 1;
            importance_sum += row.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.0);

            let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            let links = self.storage.query("memory_entities", Some("memory_id = ?1"), &[SqlValue::Integer(id)], None, None)?;
            if links.is_empty() {
                orphan_memories += 1;
            }
        }
        let avg_importance = if memories.is_empty() { 0.0 } else { importance_sum / memories.len() as f64 };

        let stale_cutoff = (chrono::Utc::now() - chrono::Duration::days(90)).to_rfc3339();
        let stale_entities = self.storage.query(
            "entities",
            Some("deleted_at IS NULL AND updated_at < ?1"),
            &[SqlValue::Text(stale_cutoff)],
            None,
            None,
        )?;

        Ok(SystemHealth {
            entities_total: entities.len() as i64,
            entities_by_type,
            memories_total: memories.len() as i64,
            memories_avg_importance: avg_importance,
            memories_by_type,
            orphan_memories,
            stale_entities: stale_entities.len() as i64,
        })
    }

    /// Snapshots health and persists the headline figures as individual
    /// metric rows, so `get_trend` can chart them over time.
    pub fn collect_and_store(&self) -> Result<SystemHealth> {
        let health = self.collect_system_health()?;
        self.record("entities_total", health.entities_total as f64, None)?;
        self.record("memories_total", health.memories_total as f64, None)?;
        for (entity_type, count) in &health.entities_by_type {
            self.record(&format!("entities_{entity_type}"), *count as f64, None)?;
        }
        for (memory_type, count) in &health.memories_by_type {
            self.record(&format!("memories_{memory_type}"), *count as f64, None)?;
        }
        Ok(health)
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SystemHealth {
    pub entities_total: i64,
    pub entities_by_type: HashMap<String, i64>,
    pub memories_total: i64,
    pub memories_avg_importance: f64,
    pub memories_by_type: HashMap<String, i64>,
    pub orphan_memories: i64,
    pub stale_entities: i64,
}
