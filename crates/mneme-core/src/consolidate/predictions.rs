//! Feedback loop for proactive predictions: whether a surfaced prediction
//! was acted on, and how that history should weight future predictions of
//! the same pattern.

use crate::storage::{Record, Storage, StorageError};
use rusqlite::types::Value as SqlValue;

/// Below this many shown predictions for a pattern there isn't enough
/// signal to trust the act-ratio, so feedback stays neutral.
const MIN_SAMPLE_SIZE: i64 = 5;

pub fn mark_prediction_acted_on(storage: &Storage, prediction_id: i64, acted_on: bool) -> Result<(), StorageError> {
    let mut values = Record::new();
    values.insert("is_acted_on".to_string(), serde_json::json!(acted_on));
    storage.update("predictions", &values, "id = ?", &[SqlValue::Integer(prediction_id)])?;
    Ok(())
}

/// Weights future confidence for `(prediction_type, pattern_name)` based on
/// how often past predictions of that pattern were acted on. Returns a
/// multiplier: 1.0 is neutral, below is a penalty, above is a boost.
pub fn get_pattern_feedback(storage: &Storage, prediction_type: &str, pattern_name: &str) -> Result<f64, StorageError> {
    let rows = storage.query(
        "predictions",
        Some("prediction_type = ?1 AND prediction_pattern_name = ?2"),
        &[SqlValue::Text(prediction_type.to_string()), SqlValue::Text(pattern_name.to_string())],
        None,
        None,
    )?;

    let shown = rows.len() as i64;
    if shown < MIN_SAMPLE_SIZE {
        return Ok(1.0);
    }

    let acted = rows
        .iter()
        .filter(|r| r.get("is_acted_on").and_then(|v| v.as_i64()).unwrap_or(0) != 0)
        .count() as f64;
    let act_ratio = acted / shown as f64;

    if act_ratio < 0.1 {
        Ok(0.5)
    } else if act_ratio > 0.5 {
        Ok(1.25)
    } else {
        Ok(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use tempfile::tempdir;

    fn seed_predictions(storage: &Storage, prediction_type: &str, pattern: &str, total: usize, acted: usize) {
        for i in 0..total {
            storage
                .insert(
                    "predictions",
                    &record! {
                        "prediction_type" => prediction_type,
                        "prediction_pattern_name" => pattern,
                        "content" => format!("prediction {}", i),
                        "is_acted_on" => i < acted,
                    },
                )
                .unwrap();
        }
    }

    #[test]
    fn fewer_than_five_shown_is_neutral() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        seed_predictions(&storage, "habit", "morning-standup", 3, 3);
        assert_eq!(get_pattern_feedback(&storage, "habit", "morning-standup").unwrap(), 1.0);
    }

    #[test]
    fn low_act_ratio_halves_confidence() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        seed_predictions(&storage, "habit", "friday-report", 10, 0);
        assert_eq!(get_pattern_feedback(&storage, "habit", "friday-report").unwrap(), 0.5);
    }

    #[test]
    fn high_act_ratio_boosts_confidence() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        seed_predictions(&storage, "habit", "weekly-sync", 10, 8);
        assert_eq!(get_pattern_feedback(&storage, "habit", "weekly-sync").unwrap(), 1.25);
    }

    #[test]
    fn mid_range_act_ratio_stays_neutral() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        seed_predictions(&storage, "habit", "mid-range", 10, 3);
        assert_eq!(get_pattern_feedback(&storage, "habit", "mid-range").unwrap(), 1.0);
    }

    #[test]
    fn marking_acted_on_persists() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        let id = storage
            .insert(
                "predictions",
                &record! {"prediction_type" => "habit", "prediction_pattern_name" => "p", "content" => "c", "is_acted_on" => false},
            )
            .unwrap();

        mark_prediction_acted_on(&storage, id, true).unwrap();

        let row = storage.get_one("predictions", "id = ?1", &[SqlValue::Integer(id)]).unwrap().unwrap();
        assert_eq!(row.get("is_acted_on").unwrap().as_i64().unwrap(), 1);
    }
}
