//! Contact-velocity classification and attention tiering for entities.

use super::parse_flexible_timestamp;
use crate::storage::{Record, Storage, StorageError};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;

const ACTIVE_DAYS: i64 = 7;
const WATCH_DAYS: i64 = 30;
const DORMANT_DAYS: i64 = 90;

/// Classifies trend by comparing the mean interval of the more-recent half
/// of an entity's inter-memory intervals against the earlier half: a
/// meaningfully shorter recent mean is accelerating, meaningfully longer is
/// decelerating, otherwise stable. A long gap since the last contact wins
/// as dormant regardless of the historical interval shape.
pub fn classify_contact_trend(intervals_days: &[f64], days_since_last_contact: f64) -> &'static str {
    if days_since_last_contact > DORMANT_DAYS as f64 {
        return "dormant";
    }
    if intervals_days.len() < 2 {
        return "stable";
    }

    let mid = intervals_days.len() / 2;
    let (earlier, recent) = intervals_days.split_at(mid);
    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let earlier_mean = mean(earlier);
    let recent_mean = mean(recent);

    if earlier_mean <= 0.0 {
        return "stable";
    }
    let ratio = recent_mean / earlier_mean;
    if ratio < 0.75 {
        "accelerating"
    } else if ratio > 1.25 {
        "decelerating"
    } else {
        "stable"
    }
}

pub fn attention_tier_for(days_since_last_contact: f64) -> &'static str {
    if days_since_last_contact < ACTIVE_DAYS as f64 {
        "active"
    } else if days_since_last_contact < WATCH_DAYS as f64 {
        "watch"
    } else if days_since_last_contact < DORMANT_DAYS as f64 {
        "dormant"
    } else {
        "archive"
    }
}

pub fn update_contact_velocity(storage: &Storage) -> Result<usize, StorageError> {
    let entities = storage.query("entities", Some("deleted_at IS NULL"), &[], None, None)?;
    let mut updated = 0;

    for entity in entities {
        let entity_id = entity.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
        let links = storage.query(
            "memory_entities",
            Some("entity_id = ?1"),
            &[SqlValue::Integer(entity_id)],
            None,
            None,
        )?;
        if links.len() < 2 {
            continue;
        }

        let mut timestamps: Vec<chrono::DateTime<Utc>> = Vec::new();
        for link in &links {
            let Some(memory_id) = link.get("memory_id").and_then(|v| v.as_i64()) else { continue };
            if let Some(memory) = storage.get_one("memories", "id = ?1", &[SqlValue::Integer(memory_id)])? {
                if let Some(ts) = memory.get("created_at").and_then(|v| v.as_str()).and_then(parse_flexible_timestamp) {
                    timestamps.push(ts);
                }
            }
        }
        if timestamps.len() < 2 {
            continue;
        }
        timestamps.sort();

        let intervals_days: Vec<f64> = timestamps.windows(2).map(|w| (w[1] - w[0]).num_minutes() as f64 / 1440.0).collect();
        let mean_interval = intervals_days.iter().sum::<f64>() / intervals_days.len() as f64;

        let last_contact = *timestamps.last().unwrap();
        let days_since_last_contact = (Utc::now() - last_contact).num_minutes() as f64 / 1440.0;
        let trend = classify_contact_trend(&intervals_days, days_since_last_contact);

        let mut values = Record::new();
        values.insert("contact_frequency_days".to_string(), serde_json::json!(mean_interval));
        values.insert("contact_trend".to_string(), serde_json::json!(trend));
        values.insert("last_contact_at".to_string(), serde_json::json!(last_contact.to_rfc3339()));
        storage.update("entities", &values, "id = ?", &[SqlValue::Integer(entity_id)])?;
        updated += 1;
    }

    Ok(updated)
}

pub fn update_attention_tiers(storage: &Storage) -> Result<usize, StorageError> {
    let entities = storage.query("entities", Some("deleted_at IS NULL"), &[], None, None)?;
    let now = Utc::now();
    let mut updated = 0;

    for entity in entities {
        let entity_id = entity.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
        let Some(last_contact) = entity.get("last_contact_at").and_then(|v| v.as_str()).and_then(parse_flexible_timestamp) else {
            continue;
        };
        let days_since = (now - last_contact).num_minutes() as f64 / 1440.0;
        let tier = attention_tier_for(days_since);

        let mut values = Record::new();
        values.insert("attention_tier".to_string(), serde_json::json!(tier));
        storage.update("entities", &values, "id = ?", &[SqlValue::Integer(entity_id)])?;
        updated += 1;
    }

    Ok(updated)
}
