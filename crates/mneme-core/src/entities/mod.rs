//! Entity and relationship CRUD: the write surface the relationship guards
//! in [`crate::guards`] actually exist for.

use crate::audit::{AuditLog, LogEntry};
use crate::guards::{
    origin_strength_ceiling, reinforcement_increment, validate_entity_with_existing, validate_relationship_with_origin,
};
use crate::storage::{Record, Storage, StorageError};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("audit error: {0}")]
    Audit(#[from] crate::audit::AuditError),
}

pub type Result<T> = std::result::Result<T, EntityError>;

#[derive(Debug, Clone, Serialize)]
pub struct MutationResult {
    pub success: bool,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl MutationResult {
    fn ok(warnings: Vec<String>) -> Self {
        Self { success: true, error: None, warnings }
    }

    fn err(reason: String) -> Self {
        Self { success: false, error: Some(reason), warnings: Vec::new() }
    }
}

fn live_canonical_names(storage: &Storage) -> Result<Vec<String>> {
    let rows = storage.query("entities", Some("deleted_at IS NULL"), &[], None, None)?;
    Ok(rows.into_iter().filter_map(|row| row.get("canonical_name").and_then(|v| v.as_str()).map(str::to_string)).collect())
}

/// Creates an entity, flagging (but not blocking on) a near-duplicate of an
/// existing live entity's canonical name.
pub fn create_entity(storage: &Storage, name: &str, entity_type: &str) -> Result<i64> {
    let existing = live_canonical_names(storage)?;
    let validation = validate_entity_with_existing(name, entity_type, &existing);

    let mut values = Record::new();
    values.insert("name".to_string(), serde_json::json!(name));
    values.insert("canonical_name".to_string(), serde_json::json!(name.to_lowercase()));
    values.insert("type".to_string(), serde_json::json!(entity_type));
    let id = storage.insert("entities", &values)?;

    AuditLog::new(storage).log(LogEntry {
        operation: "entity_created",
        entity_id: Some(id),
        user_initiated: true,
        details: Some(serde_json::json!({"warnings": validation.warnings})),
        ..Default::default()
    })?;

    Ok(id)
}

/// Renames and/or retypes an entity. `canonical_name` is recomputed from a
/// new name; `importance` is passed through unclamped since it is not a
/// guarded field.
pub fn update_entity(storage: &Storage, entity_id: i64, name: Option<&str>, entity_type: Option<&str>) -> Result<MutationResult> {
    let exists = storage.get_one("entities", "id = ?1", &[SqlValue::Integer(entity_id)])?.is_some();
    if !exists {
        return Ok(MutationResult::err(format!("entity {} not found", entity_id)));
    }

    let mut warnings = Vec::new();
    let mut values = Record::new();
    if let Some(name) = name {
        let existing = live_canonical_names(storage)?;
        let validation = validate_entity_with_existing(name, entity_type.unwrap_or("other"), &existing);
        if !validation.is_valid {
            return Ok(MutationResult::err(validation.warnings.join("; ")));
        }
        warnings.extend(validation.warnings);
        values.insert("name".to_string(), serde_json::json!(name));
        values.insert("canonical_name".to_string(), serde_json::json!(name.to_lowercase()));
    }
    if let Some(entity_type) = entity_type {
        values.insert("type".to_string(), serde_json::json!(entity_type));
    }
    values.insert("updated_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
    storage.update("entities", &values, "id = ?", &[SqlValue::Integer(entity_id)])?;

    AuditLog::new(storage).log(LogEntry {
        operation: "entity_updated",
        entity_id: Some(entity_id),
        user_initiated: true,
        ..Default::default()
    })?;

    Ok(MutationResult::ok(warnings))
}

/// Soft-deletes an entity: `deleted_at`/`deleted_reason` are set rather than
/// removing the row, so relationships and memory links survive for history.
pub fn delete_entity(storage: &Storage, entity_id: i64, reason: Option<&str>) -> Result<MutationResult> {
    let exists = storage.get_one("entities", "id = ?1", &[SqlValue::Integer(entity_id)])?.is_some();
    if !exists {
        return Ok(MutationResult::err(format!("entity {} not found", entity_id)));
    }

    let mut values = Record::new();
    values.insert("deleted_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
    values.insert("deleted_reason".to_string(), serde_json::json!(reason));
    storage.update("entities", &values, "id = ?", &[SqlValue::Integer(entity_id)])?;

    AuditLog::new(storage).log(LogEntry {
        operation: "entity_deleted",
        entity_id: Some(entity_id),
        user_initiated: true,
        details: Some(serde_json::json!({"reason": reason})),
        ..Default::default()
    })?;

    Ok(MutationResult::ok(Vec::new()))
}

/// Creates a relationship, clamping `strength` into `[0, 1]` and then
/// capping it at `origin_type`'s trust ceiling.
pub fn create_relationship(
    storage: &Storage,
    source_entity_id: i64,
    target_entity_id: i64,
    relationship_type: &str,
    strength: f64,
    origin_type: &str,
) -> Result<i64> {
    let validation = validate_relationship_with_origin(strength, origin_type);
    let strength = validation.adjustments.get("strength").and_then(|v| v.as_f64()).unwrap_or(strength);

    let mut values = Record::new();
    values.insert("source_entity_id".to_string(), serde_json::json!(source_entity_id));
    values.insert("target_entity_id".to_string(), serde_json::json!(target_entity_id));
    values.insert("relationship_type".to_string(), serde_json::json!(relationship_type));
    values.insert("strength".to_string(), serde_json::json!(strength));
    values.insert("origin_type".to_string(), serde_json::json!(origin_type));
    let id = storage.insert("relationships", &values)?;

    AuditLog::new(storage).log(LogEntry {
        operation: "relationship_created",
        entity_id: Some(source_entity_id),
        details: Some(serde_json::json!({"relationship_id": id, "target_entity_id": target_entity_id, "warnings": validation.warnings})),
        ..Default::default()
    })?;

    Ok(id)
}

/// Reinforces an existing relationship: strength grows by
/// [`reinforcement_increment`] for its origin, capped at
/// [`origin_strength_ceiling`]. Returns the relationship's new strength.
pub fn reinforce_relationship(storage: &Storage, relationship_id: i64) -> Result<MutationResult> {
    let Some(existing) = storage.get_one("relationships", "id = ?1", &[SqlValue::Integer(relationship_id)])? else {
        return Ok(MutationResult::err(format!("relationship {} not found", relationship_id)));
    };
    let origin_type = existing.get("origin_type").and_then(|v| v.as_str()).unwrap_or("inferred").to_string();
    let current = existing.get("strength").and_then(|v| v.as_f64()).unwrap_or(0.5);
    let ceiling = origin_strength_ceiling(&origin_type);
    let next = (current + reinforcement_increment(&origin_type)).min(ceiling);

    let mut values = Record::new();
    values.insert("strength".to_string(), serde_json::json!(next));
    values.insert("updated_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
    storage.update("relationships", &values, "id = ?", &[SqlValue::Integer(relationship_id)])?;

    AuditLog::new(storage).log(LogEntry {
        operation: "relationship_reinforced",
        details: Some(serde_json::json!({"relationship_id": relationship_id, "strength": next})),
        ..Default::default()
    })?;

    Ok(MutationResult::ok(Vec::new()))
}

/// Directly sets a relationship's `strength`, still guarded by its origin's
/// ceiling rather than trusting the caller's value outright.
pub fn update_relationship(storage: &Storage, relationship_id: i64, strength: f64) -> Result<MutationResult> {
    let Some(existing) = storage.get_one("relationships", "id = ?1", &[SqlValue::Integer(relationship_id)])? else {
        return Ok(MutationResult::err(format!("relationship {} not found", relationship_id)));
    };
    let origin_type = existing.get("origin_type").and_then(|v| v.as_str()).unwrap_or("inferred").to_string();
    let validation = validate_relationship_with_origin(strength, &origin_type);
    let final_strength = validation.adjustments.get("strength").and_then(|v| v.as_f64()).unwrap_or(strength);

    let mut values = Record::new();
    values.insert("strength".to_string(), serde_json::json!(final_strength));
    values.insert("updated_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
    storage.update("relationships", &values, "id = ?", &[SqlValue::Integer(relationship_id)])?;

    AuditLog::new(storage).log(LogEntry {
        operation: "relationship_updated",
        details: Some(serde_json::json!({"relationship_id": relationship_id, "strength": final_strength, "warnings": validation.warnings})),
        ..Default::default()
    })?;

    Ok(MutationResult::ok(validation.warnings))
}

/// Hard-deletes a relationship: unlike entities, relationships carry no
/// history worth preserving once severed.
pub fn delete_relationship(storage: &Storage, relationship_id: i64) -> Result<MutationResult> {
    let deleted = storage.delete("relationships", "id = ?1", &[SqlValue::Integer(relationship_id)])?;
    if deleted == 0 {
        return Ok(MutationResult::err(format!("relationship {} not found", relationship_id)));
    }

    AuditLog::new(storage).log(LogEntry {
        operation: "relationship_deleted",
        details: Some(serde_json::json!({"relationship_id": relationship_id})),
        ..Default::default()
    })?;

    Ok(MutationResult::ok(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn storage() -> (Storage, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (Storage::new(Some(dir.path().join("t.db"))).unwrap(), dir)
    }

    #[test]
    fn create_entity_stores_lowercased_canonical_name() {
        let (storage, _dir) = storage();
        let id = create_entity(&storage, "Sarah Chen", "person").unwrap();
        let row = storage.get_one("entities", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
        assert_eq!(row.get("canonical_name").unwrap().as_str().unwrap(), "sarah chen");
    }

    #[test]
    fn create_entity_near_duplicate_still_succeeds_but_is_audited() {
        let (storage, _dir) = storage();
        create_entity(&storage, "Sarah Chenn", "person").unwrap();
        let second = create_entity(&storage, "Sarah Chen", "person").unwrap();

        let history = AuditLog::new(&storage).get_entity_history(second).unwrap();
        let details = history[0].get("details").unwrap();
        assert!(!details["warnings"].as_array().unwrap().is_empty());
    }

    #[test]
    fn update_entity_renames_and_recomputes_canonical_name() {
        let (storage, _dir) = storage();
        let id = create_entity(&storage, "Acme", "organization").unwrap();
        let result = update_entity(&storage, id, Some("Acme Corp"), None).unwrap();
        assert!(result.success);

        let row = storage.get_one("entities", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
        assert_eq!(row.get("name").unwrap().as_str().unwrap(), "Acme Corp");
        assert_eq!(row.get("canonical_name").unwrap().as_str().unwrap(), "acme corp");
    }

    #[test]
    fn update_nonexistent_entity_fails_gracefully() {
        let (storage, _dir) = storage();
        let result = update_entity(&storage, 9999, Some("Ghost"), None).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn delete_entity_sets_deleted_at_without_removing_the_row() {
        let (storage, _dir) = storage();
        let id = create_entity(&storage, "Stale Project", "project").unwrap();
        let result = delete_entity(&storage, id, Some("archived")).unwrap();
        assert!(result.success);

        let row = storage.get_one("entities", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
        assert!(row.get("deleted_at").unwrap().is_string());
        assert_eq!(row.get("deleted_reason").unwrap().as_str().unwrap(), "archived");
    }

    #[test]
    fn create_relationship_caps_strength_at_origin_ceiling() {
        let (storage, _dir) = storage();
        let a = create_entity(&storage, "Alice", "person").unwrap();
        let b = create_entity(&storage, "Bob", "person").unwrap();

        let id = create_relationship(&storage, a, b, "knows", 1.0, "inferred").unwrap();

        let row = storage.get_one("relationships", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
        assert_eq!(row.get("strength").unwrap().as_f64().unwrap(), 0.5);
    }

    #[test]
    fn reinforce_relationship_grows_strength_up_to_the_ceiling() {
        let (storage, _dir) = storage();
        let a = create_entity(&storage, "Alice", "person").unwrap();
        let b = create_entity(&storage, "Bob", "person").unwrap();
        let id = create_relationship(&storage, a, b, "knows", 0.4, "extracted").unwrap();

        reinforce_relationship(&storage, id).unwrap();
        let row = storage.get_one("relationships", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
        assert!((row.get("strength").unwrap().as_f64().unwrap() - 0.5).abs() < 1e-9);

        // Further reinforcement is capped at the "extracted" ceiling of 0.8.
        for _ in 0..10 {
            reinforce_relationship(&storage, id).unwrap();
        }
        let row = storage.get_one("relationships", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
        assert_eq!(row.get("strength").unwrap().as_f64().unwrap(), 0.8);
    }

    #[test]
    fn update_relationship_is_still_guarded_by_origin_ceiling() {
        let (storage, _dir) = storage();
        let a = create_entity(&storage, "Alice", "person").unwrap();
        let b = create_entity(&storage, "Bob", "person").unwrap();
        let id = create_relationship(&storage, a, b, "knows", 0.2, "inferred").unwrap();

        update_relationship(&storage, id, 0.9).unwrap();
        let row = storage.get_one("relationships", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
        assert_eq!(row.get("strength").unwrap().as_f64().unwrap(), 0.5);
    }

    #[test]
    fn delete_relationship_removes_the_row() {
        let (storage, _dir) = storage();
        let a = create_entity(&storage, "Alice", "person").unwrap();
        let b = create_entity(&storage, "Bob", "person").unwrap();
        let id = create_relationship(&storage, a, b, "knows", 0.5, "user_stated").unwrap();

        let result = delete_relationship(&storage, id).unwrap();
        assert!(result.success);
        assert!(storage.get_one("relationships", "id = ?1", &[SqlValue::Integer(id)]).unwrap().is_none());
    }

    #[test]
    fn delete_nonexistent_relationship_fails_gracefully() {
        let (storage, _dir) = storage();
        let result = delete_relationship(&storage, 12345).unwrap();
        assert!(!result.success);
    }
}
