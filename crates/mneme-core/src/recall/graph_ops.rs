//! Graph-analytics operations over the entity relationship graph: bounded
//! expansion, shortest path, hub detection, and dormancy.

use super::Result;
use crate::search::graph::{Edge, WEAK_EDGE_THRESHOLD};
use crate::storage::{Record, Storage};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};

pub(crate) fn build_adjacency(storage: &Storage) -> Result<HashMap<i64, Vec<Edge>>> {
    let rows = storage.query("relationships", None, &[], None, None)?;
    let mut adjacency: HashMap<i64, Vec<Edge>> = HashMap::new();
    for row in rows {
        let Some(source) = row.get("source_entity_id").and_then(|v| v.as_i64()) else { continue };
        let Some(target) = row.get("target_entity_id").and_then(|v| v.as_i64()) else { continue };
        let strength = row.get("strength").and_then(|v| v.as_f64()).unwrap_or(0.5);
        let direction = row.get("direction").and_then(|v| v.as_str()).unwrap_or("bidirectional").to_string();

        adjacency.entry(source).or_default().push(Edge { target, strength });
        if direction == "bidirectional" {
            adjacency.entry(target).or_default().push(Edge { target: source, strength });
        }
    }
    Ok(adjacency)
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpandedEntity {
    pub id: i64,
    pub name: String,
    pub depth: usize,
    pub strength: f64,
}

/// Breadth-first expansion from `origin_id`, excluding the origin even via
/// a mutual back-edge, stopping strictly at `depth`, and capping the
/// frontier considered at each hop to `limit_per_hop`.
pub fn expand_graph(storage: &Storage, origin_id: i64, depth: usize, limit_per_hop: usize) -> Result<Vec<ExpandedEntity>> {
    let adjacency = build_adjacency(storage)?;
    let mut visited = HashSet::new();
    visited.insert(origin_id);

    let mut frontier = vec![origin_id];
    let mut found: Vec<(i64, usize, f64)> = Vec::new();

    for level in 1..=depth {
        let mut next_frontier = Vec::new();
        let mut hop_candidates: Vec<(i64, f64)> = Vec::new();
        for &node in &frontier {
            let Some(edges) = adjacency.get(&node) else { continue };
            for edge in edges {
                if edge.strength <= WEAK_EDGE_THRESHOLD || visited.contains(&edge.target) {
                    continue;
                }
                hop_candidates.push((edge.target, edge.strength));
            }
        }
        hop_candidates.truncate(limit_per_hop.max(1) * frontier.len().max(1));

        for (target, strength) in hop_candidates {
            if visited.insert(target) {
                found.push((target, level, strength));
                next_frontier.push(target);
            }
        }
        frontier = next_frontier;
        if frontier.is_empty() {
            break;
        }
    }

    let mut out = Vec::new();
    for (id, depth, strength) in found {
        if let Some(entity) = storage.get_one("entities", "id = ?1", &[SqlValue::Integer(id)])? {
            out.push(ExpandedEntity {
                id,
                name: entity.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                depth,
                strength,
            });
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityOverview {
    pub entity: Record,
    pub memory_count: usize,
    pub relationship_count: usize,
    pub neighbors: Vec<ExpandedEntity>,
}

pub fn get_entity_overview(storage: &Storage, name: &str) -> Result<Option<EntityOverview>> {
    let canonical = crate::extract::canonical_name(name);
    let Some(entity) = storage.get_one("entities", "canonical_name = ?1", &[SqlValue::Text(canonical)])? else {
        return Ok(None);
    };
    let entity_id = entity.get("id").and_then(|v| v.as_i64()).unwrap_or_default();

    let memory_count = storage.query("memory_entities", Some("entity_id = ?1"), &[SqlValue::Integer(entity_id)], None, None)?.len();
    let relationship_count = storage
        .execute(
            "SELECT id FROM relationships WHERE source_entity_id = ?1 OR target_entity_id = ?1",
            &[SqlValue::Integer(entity_id)],
            true,
        )?
        .len();
    let neighbors = expand_graph(storage, entity_id, 1, usize::MAX)?;

    Ok(Some(EntityOverview { entity, memory_count, relationship_count, neighbors }))
}

/// Multi-hop expansion (depth 2) used to describe a project entity's
/// surrounding network of collaborators and related concepts.
pub fn get_project_network(storage: &Storage, name: &str) -> Result<Vec<ExpandedEntity>> {
    let canonical = crate::extract::canonical_name(name);
    let Some(entity) = storage.get_one("entities", "canonical_name = ?1", &[SqlValue::Text(canonical)])? else {
        return Ok(Vec::new());
    };
    let entity_id = entity.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
    expand_graph(storage, entity_id, 2, usize::MAX)
}

/// Shortest path between two entities (by hop count, ignoring strength),
/// up to `max_hops`. Returns `None` when no such path exists.
pub fn find_path(storage: &Storage, from_id: i64, to_id: i64, max_hops: usize) -> Result<Option<Vec<i64>>> {
    if from_id == to_id {
        return Ok(Some(vec![from_id]));
    }
    let adjacency = build_adjacency(storage)?;

    let mut visited = HashSet::new();
    visited.insert(from_id);
    let mut queue = VecDeque::new();
    queue.push_back((from_id, vec![from_id]));

    while let Some((node, path)) = queue.pop_front() {
        if path.len() - 1 >= max_hops {
            continue;
        }
        let Some(edges) = adjacency.get(&node) else { continue };
        for edge in edges {
            if edge.strength <= WEAK_EDGE_THRESHOLD || visited.contains(&edge.target) {
                continue;
            }
            let mut next_path = path.clone();
            next_path.push(edge.target);
            if edge.target == to_id {
                return Ok(Some(next_path));
            }
            visited.insert(edge.target);
            queue.push_back((edge.target, next_path));
        }
    }
    Ok(None)
}

#[derive(Debug, Clone, Serialize)]
pub struct HubEntity {
    pub id: i64,
    pub name: String,
    pub connection_count: usize,
}

/// Entities ranked by total relationship degree, descending.
pub fn get_hub_entities(storage: &Storage, top_n: usize) -> Result<Vec<HubEntity>> {
    let entities = storage.query("entities", Some("deleted_at IS NULL"), &[], None, None)?;
    let mut hubs = Vec::new();
    for entity in entities {
        let id = entity.get("id").and_then(|v| v.as_i64()).unwrap_or_default();
        let count = storage
            .execute(
                "SELECT id FROM relationships WHERE source_entity_id = ?1 OR target_entity_id = ?1",
                &[SqlValue::Integer(id)],
                true,
            )?
            .len();
        if count > 0 {
            hubs.push(HubEntity { id, name: entity.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(), connection_count: count });
        }
    }
    hubs.sort_by(|a, b| b.connection_count.cmp(&a.connection_count));
    hubs.truncate(top_n);
    Ok(hubs)
}

#[derive(Debug, Clone, Serialize)]
pub struct DormantRelationship {
    pub source_id: i64,
    pub target_id: i64,
    pub relationship_type: String,
    pub updated_at: String,
    pub days_stale: f64,
}

/// Relationships untouched for at least `threshold_days`, staler first.
pub fn get_dormant_relationships(storage: &Storage, threshold_days: f64) -> Result<Vec<DormantRelationship>> {
    let rows = storage.query("relationships", None, &[], None, None)?;
    let now = Utc::now();
    let mut dormant = Vec::new();

    for row in rows {
        let Some(updated_at) = row.get("updated_at").and_then(|v| v.as_str()) else { continue };
        let Some(ts) = crate::consolidate::parse_flexible_timestamp(updated_at) else { continue };
        let days_stale = (now - ts).num_minutes() as f64 / 1440.0;
        if days_stale >= threshold_days {
            dormant.push(DormantRelationship {
                source_id: row.get("source_entity_id").and_then(|v| v.as_i64()).unwrap_or_default(),
                target_id: row.get("target_entity_id").and_then(|v| v.as_i64()).unwrap_or_default(),
                relationship_type: row.get("relationship_type").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                updated_at: updated_at.to_string(),
                days_stale,
            });
        }
    }
    dormant.sort_by(|a, b| b.days_stale.partial_cmp(&a.days_stale).unwrap_or(std::cmp::Ordering::Equal));
    Ok(dormant)
}
