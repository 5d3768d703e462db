//! Scheduled consolidation: decay, deadline surge, contact velocity,
//! attention tiering, near-duplicate merging, and prediction feedback.

mod merge;
mod predictions;
mod velocity;

pub use merge::merge_similar_memories;
pub use predictions::{get_pattern_feedback, mark_prediction_acted_on};
pub use velocity::{attention_tier_for, classify_contact_trend, update_attention_tiers, update_contact_velocity};

use crate::audit::{AuditLog, LogEntry};
use crate::config::MemoryConfig;
use crate::storage::{Record, Storage, StorageError};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ConsolidateError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("audit error: {0}")]
    Audit(#[from] crate::audit::AuditError),
}

pub type Result<T> = std::result::Result<T, ConsolidateError>;

/// Orchestrates one full consolidation pass. Each phase is independent: a
/// failure in one does not prevent the others from running (the scheduler
/// isolates job failures at a coarser grain, but this keeps phases resilient
/// to partial data too).
pub struct ConsolidateService {
    storage: Arc<Storage>,
    config: Arc<MemoryConfig>,
}

impl ConsolidateService {
    pub fn new(storage: Arc<Storage>, config: Arc<MemoryConfig>) -> Self {
        Self { storage, config }
    }

    /// Surges approaching-deadline commitments, then applies exponential
    /// decay to importance for everything else. Surge runs first, and its
    /// surged ids are excluded from the decay pass, so a commitment just
    /// raised to its deadline-band importance never loses it again in the
    /// same `run_decay` call.
    pub fn run_decay(&self) -> Result<usize> {
        let surged = self.surge_approaching_deadlines()?;
        self.decay_importance(&surged)
    }

    /// Commitments overdue surge to 1.0; due within 48h to >= 0.95; due
    /// within a week to >= 0.85. Only affects `importance`, and only upward.
    /// Returns the set of memory ids that were actually surged this pass.
    pub fn surge_approaching_deadlines(&self) -> Result<HashSet<i64>> {
        let rows = self.storage.query(
            "memories",
            Some("type = 'commitment' AND deadline_at IS NOT NULL AND invalidated_at IS NULL"),
            &[],
            None,
            None,
        )?;

        let now = Utc::now();
        let mut surged = HashSet::new();
        for row in rows {
            let Some(deadline_str) = row.get("deadline_at").and_then(|v| v.as_str()) else { continue };
            let Some(deadline) = parse_flexible_timestamp(deadline_str) else { continue };
            let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            let current_importance = row.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.5);

            let hours_remaining = (deadline - now).num_minutes() as f64 / 60.0;
            let target = if hours_remaining <= 0.0 {
                1.0
            } else if hours_remaining <= 48.0 {
                0.95
            } else if hours_remaining <= 24.0 * 7.0 {
                0.85
            } else {
                continue;
            };

            if target > current_importance {
                let mut values = Record::new();
                values.insert("importance".to_string(), serde_json::json!(target));
                self.storage.update("memories", &values, "id = ?", &[SqlValue::Integer(id)])?;
                surged.insert(id);
            }
        }

        if !surged.is_empty() {
            AuditLog::new(&self.storage).log(LogEntry {
                operation: "commitments_surged",
                details: Some(serde_json::json!({"count": surged.len()})),
                ..Default::default()
            })?;
        }
        Ok(surged)
    }

    /// Exponential daily decay on live memories' importance, floored at
    /// `min_importance_threshold`. `skip_ids` are excluded entirely -- they
    /// were surged to a deadline-band importance earlier in this same pass
    /// and must not be decayed back down before the next one.
    pub fn decay_importance(&self, skip_ids: &HashSet<i64>) -> Result<usize> {
        let rate = self.config.decay_rate_daily;
        let floor = self.config.min_importance_threshold;
        let rows = self.storage.query("memories", Some("invalidated_at IS NULL"), &[], None, None)?;

        let mut decayed = 0;
        for row in rows {
            let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            if skip_ids.contains(&id) {
                continue;
            }
            let importance = row.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.5);
            let next = (importance * rate).max(floor);
            if (next - importance).abs() > f64::EPSILON {
                let mut values = Record::new();
                values.insert("importance".to_string(), serde_json::json!(next));
                self.storage.update("memories", &values, "id = ?", &[SqlValue::Integer(id)])?;
                decayed += 1;
            }
        }
        if decayed > 0 {
            AuditLog::new(&self.storage).log(LogEntry {
                operation: "importance_decayed",
                details: Some(serde_json::json!({"count": decayed})),
                ..Default::default()
            })?;
        }
        Ok(decayed)
    }

    pub fn update_contact_velocity(&self) -> Result<usize> {
        Ok(velocity::update_contact_velocity(&self.storage)?)
    }

    pub fn update_attention_tiers(&self) -> Result<usize> {
        Ok(velocity::update_attention_tiers(&self.storage)?)
    }

    pub fn merge_similar_memories(&self) -> Result<usize> {
        Ok(merge::merge_similar_memories(&self.storage, &self.config)?)
    }

    pub fn mark_prediction_acted_on(&self, prediction_id: i64, acted_on: bool) -> Result<()> {
        Ok(predictions::mark_prediction_acted_on(&self.storage, prediction_id, acted_on)?)
    }

    pub fn get_pattern_feedback(&self, prediction_type: &str, pattern_name: &str) -> Result<f64> {
        Ok(predictions::get_pattern_feedback(&self.storage, prediction_type, pattern_name)?)
    }

    /// One full pass: decay, velocity, tiers, merge. Returns a summary of
    /// how many rows each phase touched.
    pub fn run_full_consolidation(&self) -> Result<ConsolidationSummary> {
        Ok(ConsolidationSummary {
            decayed: self.run_decay()?,
            velocity_updated: self.update_contact_velocity()?,
            tiers_updated: self.update_attention_tiers()?,
            merged: self.merge_similar_memories()?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsolidationSummary {
    pub decayed: usize,
    pub velocity_updated: usize,
    pub tiers_updated: usize,
    pub merged: usize,
}

pub(crate) fn parse_flexible_timestamp(s: &str) -> Option<chrono::DateTime<Utc>> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .map(|n| n.and_utc())
}
