//! Near-duplicate memory detection and merging.

use crate::config::MemoryConfig;
use crate::search::hybrid::cosine_similarity;
use crate::storage::{Record, Storage, StorageError};
use rusqlite::types::Value as SqlValue;

/// Importance the losing side of a merge is left at: not zero, so it can
/// still surface in an explicit audit query, but far below anything that
/// would compete in normal recall.
const MERGED_IMPORTANCE: f64 = 0.001;

/// Scans live memories with embeddings for near-duplicate pairs above
/// `similarity_merge_threshold` and folds each duplicate into the primary:
/// the higher-importance memory, ties broken by higher access_count then
/// lower id. A no-op when merging is disabled in config.
pub fn merge_similar_memories(storage: &Storage, config: &MemoryConfig) -> Result<usize, StorageError> {
    if !config.enable_memory_merging {
        return Ok(0);
    }

    let rows = storage.query(
        "memories",
        Some("invalidated_at IS NULL AND embedding IS NOT NULL"),
        &[],
        None,
        None,
    )?;

    let mut candidates: Vec<(i64, f64, i64, Vec<f32>)> = Vec::new();
    for row in &rows {
        let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
        let importance = row.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.5);
        let access_count = row.get("access_count").and_then(|v| v.as_i64()).unwrap_or(0);
        let Some(embedding) = decode_embedding(row) else { continue };
        candidates.push((id, importance, access_count, embedding));
    }
    // Primary-first ordering: higher importance, then higher access_count, then lower id.
    candidates.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.2.cmp(&a.2))
            .then(a.0.cmp(&b.0))
    });

    let mut merged_ids = std::collections::HashSet::new();
    let mut merged_count = 0;

    for i in 0..candidates.len() {
        let (primary_id, _, _, ref primary_vec) = candidates[i];
        if merged_ids.contains(&primary_id) {
            continue;
        }
        for candidate in candidates.iter().skip(i + 1) {
            let (dup_id, _, _, ref dup_vec) = *candidate;
            if merged_ids.contains(&dup_id) {
                continue;
            }
            let similarity = cosine_similarity(primary_vec, dup_vec);
            if similarity >= config.similarity_merge_threshold as f32 {
                merge_memory_pair(storage, primary_id, dup_id)?;
                merged_ids.insert(dup_id);
                merged_count += 1;
            }
        }
    }

    Ok(merged_count)
}

/// Transfers `memory_entities` links from `duplicate_id` to `primary_id`
/// (skipping links that already exist on the primary) and crushes the
/// duplicate's importance so it stops competing in recall while remaining
/// in storage for audit.
fn merge_memory_pair(storage: &Storage, primary_id: i64, duplicate_id: i64) -> Result<(), StorageError> {
    let primary_links = storage.query("memory_entities", Some("memory_id = ?1"), &[SqlValue::Integer(primary_id)], None, None)?;
    let primary_entities: std::collections::HashSet<i64> =
        primary_links.iter().filter_map(|r| r.get("entity_id").and_then(|v| v.as_i64())).collect();

    let duplicate_links = storage.query("memory_entities", Some("memory_id = ?1"), &[SqlValue::Integer(duplicate_id)], None, None)?;
    for link in duplicate_links {
        let Some(entity_id) = link.get("entity_id").and_then(|v| v.as_i64()) else { continue };
        if primary_entities.contains(&entity_id) {
            continue;
        }
        let relationship = link.get("relationship").and_then(|v| v.as_str()).unwrap_or("about").to_string();
        let mut values = Record::new();
        values.insert("memory_id".to_string(), serde_json::json!(primary_id));
        values.insert("entity_id".to_string(), serde_json::json!(entity_id));
        values.insert("relationship".to_string(), serde_json::json!(relationship));
        storage.insert("memory_entities", &values)?;
    }

    let mut values = Record::new();
    values.insert("importance".to_string(), serde_json::json!(MERGED_IMPORTANCE));
    values.insert("merged_into".to_string(), serde_json::json!(primary_id));
    storage.update("memories", &values, "id = ?", &[SqlValue::Integer(duplicate_id)])?;
    Ok(())
}

fn decode_embedding(row: &Record) -> Option<Vec<f32>> {
    let raw = row.get("embedding")?;
    match raw {
        serde_json::Value::Array(values) => Some(values.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect()),
        serde_json::Value::String(s) => serde_json::from_str(s).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use tempfile::tempdir;

    fn insert_memory(storage: &Storage, content: &str, created_at: &str, embedding: Vec<f32>) -> i64 {
        storage
            .insert(
                "memories",
                &record! {
                    "content" => content,
                    "content_hash" => content,
                    "created_at" => created_at,
                    "embedding" => embedding,
                    "importance" => 0.7,
                },
            )
            .unwrap()
    }

    #[test]
    fn disabled_merging_is_a_no_op() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        let mut config = MemoryConfig::default();
        config.enable_memory_merging = false;
        insert_memory(&storage, "a", "2024-01-01T00:00:00Z", vec![1.0, 0.0]);
        insert_memory(&storage, "b", "2024-01-02T00:00:00Z", vec![1.0, 0.0]);

        assert_eq!(merge_similar_memories(&storage, &config).unwrap(), 0);
    }

    #[test]
    fn near_identical_embeddings_merge_and_crush_duplicate_importance() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        let mut config = MemoryConfig::default();
        config.enable_memory_merging = true;
        config.similarity_merge_threshold = 0.92;

        let primary_id = insert_memory(&storage, "Met with Sarah about Acme contract", "2024-01-01T00:00:00Z", vec![1.0, 0.0, 0.0]);
        let dup_id = insert_memory(&storage, "Met Sarah re: Acme contract", "2024-01-02T00:00:00Z", vec![0.999, 0.001, 0.0]);

        let merged = merge_similar_memories(&storage, &config).unwrap();
        assert_eq!(merged, 1);

        let dup_row = storage.get_one("memories", "id = ?1", &[SqlValue::Integer(dup_id)]).unwrap().unwrap();
        assert!(dup_row.get("importance").unwrap().as_f64().unwrap() < 0.01);
        assert_eq!(dup_row.get("merged_into").unwrap().as_i64().unwrap(), primary_id);
    }

    #[test]
    fn dissimilar_embeddings_do_not_merge() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        let mut config = MemoryConfig::default();
        config.enable_memory_merging = true;
        config.similarity_merge_threshold = 0.92;

        insert_memory(&storage, "Met with Sarah about Acme", "2024-01-01T00:00:00Z", vec![1.0, 0.0, 0.0]);
        insert_memory(&storage, "Need to buy groceries", "2024-01-02T00:00:00Z", vec![0.0, 1.0, 0.0]);

        assert_eq!(merge_similar_memories(&storage, &config).unwrap(), 0);
    }

    #[test]
    fn entity_links_transfer_from_duplicate_to_primary() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        let mut config = MemoryConfig::default();
        config.enable_memory_merging = true;
        config.similarity_merge_threshold = 0.92;

        let entity_id = storage
            .insert("entities", &record! {"name" => "Sarah", "canonical_name" => "sarah", "type" => "person"})
            .unwrap();
        let primary_id = insert_memory(&storage, "a", "2024-01-01T00:00:00Z", vec![1.0, 0.0]);
        let dup_id = insert_memory(&storage, "b", "2024-01-02T00:00:00Z", vec![1.0, 0.0]);
        storage
            .insert("memory_entities", &record! {"memory_id" => dup_id, "entity_id" => entity_id, "relationship" => "about"})
            .unwrap();

        merge_similar_memories(&storage, &config).unwrap();

        let links = storage.query("memory_entities", Some("memory_id = ?1"), &[SqlValue::Integer(primary_id)], None, None).unwrap();
        assert!(links.iter().any(|l| l.get("entity_id").and_then(|v| v.as_i64()) == Some(entity_id)));
    }
}
