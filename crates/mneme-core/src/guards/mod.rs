//! Deterministic, pure validation -- no database access. Every memory, entity,
//! and relationship passes through here before it is written.

use crate::extract::has_near_duplicate;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

const MAX_CONTENT_LENGTH: usize = 500;
const TRUNCATE_CONTENT_LENGTH: usize = 1000;

/// Per-origin ceiling on relationship strength: how much trust an unverified
/// inference earns versus something the user stated outright.
pub fn origin_strength_ceiling(origin_type: &str) -> f64 {
    match origin_type {
        "user_stated" => 1.0,
        "corrected" => 1.0,
        "extracted" => 0.8,
        "inferred" => 0.5,
        _ => 0.5,
    }
}

/// How much a relationship's strength grows per reinforcement, scaled by how
/// much the origin is trusted.
pub fn reinforcement_increment(origin_type: &str) -> f64 {
    match origin_type {
        "user_stated" => 0.20,
        "corrected" => 0.20,
        "extracted" => 0.10,
        "inferred" => 0.05,
        _ => 0.05,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub warnings: Vec<String>,
    pub adjustments: HashMap<String, JsonValue>,
}

impl ValidationResult {
    fn valid() -> Self {
        Self { is_valid: true, ..Default::default() }
    }

    fn invalid(reason: &str) -> Self {
        Self { is_valid: false, warnings: vec![reason.to_string()], adjustments: HashMap::new() }
    }
}

/// Validates a memory's content and importance before insert, clamping and
/// truncating where the source data is merely careless and flagging the rest.
pub fn validate_memory(content: &str, memory_type: &str, importance: f64) -> ValidationResult {
    let mut result = ValidationResult::valid();

    if content.len() > TRUNCATE_CONTENT_LENGTH {
        let truncated: String = content.chars().take(TRUNCATE_CONTENT_LENGTH).collect();
        result.adjustments.insert("content".to_string(), JsonValue::String(truncated));
        result
            .warnings
            .push(format!("Content truncated from {} to {} characters", content.len(), TRUNCATE_CONTENT_LENGTH));
    } else if content.len() > MAX_CONTENT_LENGTH {
        result.warnings.push(format!("Long content ({} characters)", content.len()));
    }

    let clamped_importance = importance.clamp(0.0, 1.0);
    if clamped_importance != importance {
        result.adjustments.insert("importance".to_string(), JsonValue::from(clamped_importance));
    }

    if memory_type == "commitment" && !crate::extract::has_deadline_pattern(content) {
        result.warnings.push("Commitment has no detected deadline".to_string());
    }

    result
}

/// Validates a candidate entity name, flagging near-duplicates of existing names
/// so callers can offer a merge instead of creating a redundant entity.
pub fn validate_entity(name: &str, _entity_type: &str) -> ValidationResult {
    validate_entity_with_existing(name, _entity_type, &[])
}

pub fn validate_entity_with_existing(name: &str, _entity_type: &str, existing_names: &[String]) -> ValidationResult {
    if name.trim().is_empty() {
        return ValidationResult::invalid("Entity name cannot be empty");
    }

    let mut result = ValidationResult::valid();
    if let Some(near) = has_near_duplicate(name, existing_names) {
        result.warnings.push(format!("Near-duplicate of existing entity '{}'", near));
    }
    result
}

/// Clamps relationship strength to `[0, 1]`, then caps it at the origin's
/// trust ceiling, warning when the ceiling (not just the raw range) binds.
pub fn validate_relationship(strength: f64) -> ValidationResult {
    validate_relationship_with_origin(strength, "user_stated")
}

pub fn validate_relationship_with_origin(strength: f64, origin_type: &str) -> ValidationResult {
    let mut result = ValidationResult::valid();

    let clamped = strength.clamp(0.0, 1.0);
    let ceiling = origin_strength_ceiling(origin_type);
    let final_strength = clamped.min(ceiling);

    if final_strength != strength {
        result.adjustments.insert("strength".to_string(), JsonValue::from(final_strength));
    }
    if clamped > ceiling {
        result
            .warnings
            .push(format!("Strength capped at origin ceiling {} for '{}'", ceiling, origin_type));
    }

    result
}
