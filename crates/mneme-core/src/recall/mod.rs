//! Retrieval pipeline: hybrid search (vector + lexical + importance +
//! recency + graph proximity) plus the graph-analytics surface built on
//! top of the entity relationship graph.

mod graph_ops;

pub use graph_ops::{
    find_path, get_dormant_relationships, get_entity_overview, get_hub_entities, get_project_network, DormantRelationship,
    EntityOverview, ExpandedEntity, HubEntity,
};

use crate::config::MemoryConfig;
use crate::search::graph::graph_proximity_scores;
use crate::search::hybrid::{cosine_similarity, linear_combination, recency_score, reciprocal_rank_fusion};
use crate::storage::{Record, Storage, StorageError};
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, RecallError>;

#[derive(Debug, Clone, Serialize)]
pub struct RecallResult {
    pub id: i64,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    pub score: f64,
    pub importance: f64,
    pub created_at: String,
    pub entities: Vec<String>,
    pub source_channel: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecallFilters {
    pub memory_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub include_low_importance: bool,
}

/// Computes a ranked list of live memories for `query`. `query_embedding` is
/// `None` when the Embedder is unavailable, which drops the vector signal
/// and falls back to FTS/LIKE-only ranking -- never an error.
pub fn recall(
    storage: &Storage,
    config: &MemoryConfig,
    query: &str,
    query_embedding: Option<&[f32]>,
    query_entity_id: Option<i64>,
    filters: &RecallFilters,
    limit: Option<usize>,
) -> Result<Vec<RecallResult>> {
    let limit = limit.unwrap_or(config.max_recall_results);
    let mut where_clauses = vec!["invalidated_at IS NULL".to_string()];
    let mut params: Vec<SqlValue> = Vec::new();

    if let Some(t) = &filters.memory_type {
        where_clauses.push(format!("type = ?{}", params.len() + 1));
        params.push(SqlValue::Text(t.clone()));
    }
    if let Some(since) = filters.since {
        where_clauses.push(format!("created_at > ?{}", params.len() + 1));
        params.push(SqlValue::Text(since.to_rfc3339()));
    }
    if !filters.include_low_importance {
        where_clauses.push(format!("importance > ?{}", params.len() + 1));
        params.push(SqlValue::Real(config.min_importance_threshold));
    }
    let where_clause = where_clauses.join(" AND ");

    let candidates = fts_or_like_candidates(storage, query, &where_clause, &params)?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let candidate_ids: Vec<i64> = candidates.iter().map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap_or_default()).collect();
    let now = Utc::now();

    let mut vector_scores: HashMap<i64, f64> = HashMap::new();
    if let Some(query_vec) = query_embedding {
        for row in &candidates {
            let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            if let Some(embedding) = decode_embedding(row) {
                vector_scores.insert(id, cosine_similarity(query_vec, &embedding) as f64);
            }
        }
    }

    let fts_scores: HashMap<i64, f64> = candidates
        .iter()
        .map(|r| {
            let id = r.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            let rank = r.get("__fts_rank").and_then(|v| v.as_f64()).unwrap_or(0.0);
            (id, rank)
        })
        .collect();

    let importance_scores: HashMap<i64, f64> =
        candidates.iter().map(|r| (r.get("id").and_then(|v| v.as_i64()).unwrap_or_default(), r.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.5))).collect();

    let recency_scores: HashMap<i64, f64> = candidates
        .iter()
        .map(|r| {
            let id = r.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            let age_days = r
                .get("created_at")
                .and_then(|v| v.as_str())
                .and_then(|s| crate::consolidate::parse_flexible_timestamp(s))
                .map(|ts| (now - ts).num_minutes() as f64 / 1440.0)
                .unwrap_or(0.0);
            (id, recency_score(age_days, config.recency_half_life_days))
        })
        .collect();

    let graph_scores: HashMap<i64, f64> = if config.graph_proximity_enabled {
        memory_graph_scores(storage, &candidate_ids, query_entity_id)?
    } else {
        HashMap::new()
    };

    let fused = if config.enable_rrf {
        let mut rankings: HashMap<String, Vec<i64>> = HashMap::new();
        rankings.insert("vector".to_string(), ranked_ids(&vector_scores));
        rankings.insert("fts".to_string(), ranked_ids(&fts_scores));
        rankings.insert("importance".to_string(), ranked_ids(&importance_scores));
        rankings.insert("recency".to_string(), ranked_ids(&recency_scores));
        let mut scores = reciprocal_rank_fusion(&candidate_ids, &rankings, 60.0);
        for (id, boost) in &graph_scores {
            *scores.entry(*id).or_insert(0.0) += boost;
        }
        scores
    } else {
        let mut signal_scores: HashMap<String, HashMap<i64, f64>> = HashMap::new();
        signal_scores.insert("vector".to_string(), vector_scores);
        signal_scores.insert("fts".to_string(), fts_scores);
        signal_scores.insert("importance".to_string(), importance_scores);
        signal_scores.insert("recency".to_string(), recency_scores);
        let mut weights = HashMap::new();
        weights.insert("vector".to_string(), config.vector_weight);
        weights.insert("fts".to_string(), config.fts_weight);
        weights.insert("importance".to_string(), config.importance_weight);
        weights.insert("recency".to_string(), config.recency_weight);
        let mut scores = linear_combination(&candidate_ids, &signal_scores, &weights);
        for (id, boost) in &graph_scores {
            *scores.entry(*id).or_insert(0.0) += boost;
        }
        scores
    };

    let mut results: Vec<RecallResult> = candidates
        .into_iter()
        .map(|row| {
            let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
            let score = *fused.get(&id).unwrap_or(&0.0);
            to_recall_result(storage, row, score).unwrap_or_else(|_| RecallResult {
                id,
                content: String::new(),
                memory_type: String::new(),
                score,
                importance: 0.0,
                created_at: String::new(),
                entities: Vec::new(),
                source_channel: None,
            })
        })
        .collect();

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    Ok(results)
}

/// All live memories linked to the named entity, most important/recent first.
pub fn recall_about(storage: &Storage, entity_name: &str, limit: usize) -> Result<Vec<RecallResult>> {
    let canonical = crate::extract::canonical_name(entity_name);
    let Some(entity) = storage.get_one("entities", "canonical_name = ?1", &[SqlValue::Text(canonical)])? else {
        return Ok(Vec::new());
    };
    let entity_id = entity.get("id").and_then(|v| v.as_i64()).unwrap_or_default();

    let links = storage.query("memory_entities", Some("entity_id = ?1"), &[SqlValue::Integer(entity_id)], None, None)?;
    let mut results = Vec::new();
    for link in links {
        let Some(memory_id) = link.get("memory_id").and_then(|v| v.as_i64()) else { continue };
        if let Some(row) = storage.get_one("memories", "id = ?1 AND invalidated_at IS NULL", &[SqlValue::Integer(memory_id)])? {
            results.push(to_recall_result(storage, row, 0.0)?);
        }
    }
    results.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal).then(b.created_at.cmp(&a.created_at)));
    results.truncate(limit);
    Ok(results)
}

/// Live memories created within the last `hours`, most recent first.
pub fn get_recent_memories(storage: &Storage, limit: usize, hours: i64) -> Result<Vec<RecallResult>> {
    let cutoff = (Utc::now() - chrono::Duration::hours(hours)).to_rfc3339();
    let rows = storage.query(
        "memories",
        Some("invalidated_at IS NULL AND created_at > ?1"),
        &[SqlValue::Text(cutoff)],
        Some("created_at DESC"),
        Some(limit),
    )?;
    rows.into_iter().map(|row| to_recall_result(storage, row, 0.0)).collect()
}

fn ranked_ids(scores: &HashMap<i64, f64>) -> Vec<i64> {
    let mut ids: Vec<i64> = scores.keys().copied().collect();
    ids.sort_by(|a, b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
    ids
}

fn decode_embedding(row: &Record) -> Option<Vec<f32>> {
    match row.get("embedding")? {
        serde_json::Value::Array(values) => Some(values.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect()),
        serde_json::Value::String(s) => serde_json::from_str(s).ok(),
        _ => None,
    }
}

/// Selects candidates via FTS5 `MATCH` when the index has rows, falling back
/// to a `LIKE` keyword scan otherwise -- both constrained by `where_clause`.
fn fts_or_like_candidates(storage: &Storage, query: &str, where_clause: &str, params: &[SqlValue]) -> Result<Vec<Record>> {
    let fts_has_rows = !storage.execute("SELECT rowid FROM memories_fts LIMIT 1", &[], true)?.is_empty();
    if fts_has_rows && !query.trim().is_empty() {
        let sql = format!(
            "SELECT m.*, (-bm25(memories_fts)) AS __fts_rank FROM memories m \
             JOIN memories_fts ON memories_fts.rowid = m.id \
             WHERE memories_fts MATCH ?{} AND {} ORDER BY __fts_rank DESC",
            params.len() + 1,
            where_clause
        );
        let mut full_params = params.to_vec();
        full_params.push(SqlValue::Text(sanitize_fts_query(query)));
        let rows = storage.execute(&sql, &full_params, true)?;
        if !rows.is_empty() {
            return Ok(rows);
        }
    }

    if query.trim().is_empty() {
        return Ok(storage.query("memories", Some(where_clause), params, Some("created_at DESC"), None)?);
    }
    let like_clause = format!("content LIKE ?{} AND {}", params.len() + 1, where_clause);
    let mut full_params = params.to_vec();
    full_params.push(SqlValue::Text(format!("%{}%", query)));
    Ok(storage.query("memories", Some(&like_clause), &full_params, None, None)?)
}

fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| term.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|term| !term.is_empty())
        .map(|term| format!("{}*", term))
        .collect::<Vec<_>>()
        .join(" ")
}

fn memory_graph_scores(storage: &Storage, candidate_ids: &[i64], query_entity_id: Option<i64>) -> Result<HashMap<i64, f64>> {
    let Some(origin) = query_entity_id else { return Ok(HashMap::new()) };
    let adjacency = graph_ops::build_adjacency(storage)?;
    let proximity = graph_proximity_scores(&[origin], &adjacency, 2);

    let mut scores = HashMap::new();
    for &memory_id in candidate_ids {
        let links = storage.query("memory_entities", Some("memory_id = ?1"), &[SqlValue::Integer(memory_id)], None, None)?;
        let best = links
            .iter()
            .filter_map(|l| l.get("entity_id").and_then(|v| v.as_i64()))
            .filter_map(|eid| proximity.get(&eid).copied())
            .fold(0.0_f64, f64::max);
        if best > 0.0 {
            scores.insert(memory_id, best);
        }
    }
    Ok(scores)
}

fn to_recall_result(storage: &Storage, row: Record, score: f64) -> Result<RecallResult> {
    let id = row.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
    let links = storage.query("memory_entities", Some("memory_id = ?1"), &[SqlValue::Integer(id)], None, None)?;
    let mut entities = Vec::new();
    for link in links {
        if let Some(entity_id) = link.get("entity_id").and_then(|v| v.as_i64()) {
            if let Some(entity) = storage.get_one("entities", "id = ?1", &[SqlValue::Integer(entity_id)])? {
                if let Some(name) = entity.get("name").and_then(|v| v.as_str()) {
                    entities.push(name.to_string());
                }
            }
        }
    }

    Ok(RecallResult {
        id,
        content: row.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        memory_type: row.get("type").and_then(|v| v.as_str()).unwrap_or("fact").to_string(),
        score,
        importance: row.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.5),
        created_at: row.get("created_at").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        entities,
        source_channel: row.get("source_channel").and_then(|v| v.as_str()).map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use tempfile::tempdir;

    fn seed(storage: &Storage) -> i64 {
        storage
            .insert(
                "memories",
                &record! {"content" => "Sarah is leading the Acme integration project", "content_hash" => "h1", "type" => "fact", "importance" => 0.8},
            )
            .unwrap()
    }

    #[test]
    fn recall_finds_memory_by_keyword() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        seed(&storage);
        let config = MemoryConfig::default();

        let results = recall(&storage, &config, "Acme", None, None, &RecallFilters::default(), None).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("Acme"));
    }

    #[test]
    fn recall_excludes_invalidated_memories() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        let id = seed(&storage);
        let mut values = Record::new();
        values.insert("invalidated_at".to_string(), serde_json::json!(Utc::now().to_rfc3339()));
        storage.update("memories", &values, "id = ?", &[SqlValue::Integer(id)]).unwrap();

        let config = MemoryConfig::default();
        let results = recall(&storage, &config, "Acme", None, None, &RecallFilters::default(), None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn recall_about_returns_linked_memories() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        let entity_id = storage.insert("entities", &record! {"name" => "Sarah", "canonical_name" => "sarah", "type" => "person"}).unwrap();
        let memory_id = seed(&storage);
        storage.insert("memory_entities", &record! {"memory_id" => memory_id, "entity_id" => entity_id, "relationship" => "about"}).unwrap();

        let results = recall_about(&storage, "Sarah", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, memory_id);
    }

    #[test]
    fn recall_about_unknown_entity_returns_empty() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        let results = recall_about(&storage, "Nobody", 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn get_recent_memories_respects_hours_window() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("t.db"))).unwrap();
        let old = (Utc::now() - chrono::Duration::hours(48)).to_rfc3339();
        storage.insert("memories", &record! {"content" => "old", "content_hash" => "old", "created_at" => old}).unwrap();
        let recent_id = storage.insert("memories", &record! {"content" => "recent", "content_hash" => "recent", "created_at" => Utc::now().to_rfc3339()}).unwrap();

        let results = get_recent_memories(&storage, 10, 24).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, recent_id);
    }
}
