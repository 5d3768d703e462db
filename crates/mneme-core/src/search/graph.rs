//! Relationship-graph traversal used to boost recall for memories about
//! entities near a query's mentioned entities.

use std::collections::{HashMap, HashSet, VecDeque};

/// Strength at or below this threshold is never traversed, not merely
/// down-weighted -- the edge is treated as if it did not exist.
pub const WEAK_EDGE_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub target: i64,
    pub strength: f64,
}

/// Breadth-first, depth-limited, cycle-free traversal from `origin`. Returns
/// the shortest hop-count (and the edge strength that reached it) for every
/// entity reachable within `max_depth`, excluding the origin itself even via
/// a back-edge. Edges at or below [`WEAK_EDGE_THRESHOLD`] are never followed.
pub fn bfs_reachable(origin: i64, adjacency: &HashMap<i64, Vec<Edge>>, max_depth: usize) -> HashMap<i64, (usize, f64)> {
    let mut visited: HashSet<i64> = HashSet::new();
    visited.insert(origin);

    let mut reachable: HashMap<i64, (usize, f64)> = HashMap::new();
    let mut queue: VecDeque<(i64, usize)> = VecDeque::new();
    queue.push_back((origin, 0));

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let Some(edges) = adjacency.get(&node) else { continue };
        for edge in edges {
            if edge.strength <= WEAK_EDGE_THRESHOLD || visited.contains(&edge.target) {
                continue;
            }
            visited.insert(edge.target);
            reachable.insert(edge.target, (depth + 1, edge.strength));
            queue.push_back((edge.target, depth + 1));
        }
    }

    reachable
}

/// Per-hop multiplier applied beyond the first hop, so a 2-hop neighbor
/// scores strictly lower than a 1-hop one at the same edge strength.
const HOP_DECAY: f64 = 0.5;

/// Entity-proximity score for a memory given which entities it mentions and
/// how those entities sit relative to the query's directly-mentioned entities.
///
/// - An entity directly mentioned by the query scores 1.0.
/// - A 1-hop neighbor of a mentioned entity scores `0.5 + 0.3 * strength`.
/// - Each additional hop beyond the first scales that score down by
///   [`HOP_DECAY`] per hop, rather than dropping the entity.
/// - Anything unreached (no path within `max_depth`) is absent from the map
///   entirely, not present with a zero score.
pub fn graph_proximity_scores(mentioned_entities: &[i64], adjacency: &HashMap<i64, Vec<Edge>>, max_depth: usize) -> HashMap<i64, f64> {
    let mut scores: HashMap<i64, f64> = HashMap::new();

    for &entity_id in mentioned_entities {
        scores.insert(entity_id, 1.0);
    }

    for &origin in mentioned_entities {
        for (neighbor, (depth, strength)) in bfs_reachable(origin, adjacency, max_depth) {
            if scores.contains_key(&neighbor) {
                continue; // a directly mentioned or nearer-hop entity wins
            }
            let base = 0.5 + 0.3 * strength;
            let score = if depth <= 1 { base } else { base * HOP_DECAY.powi(depth as i32 - 1) };
            scores
                .entry(neighbor)
                .and_modify(|s| *s = s.max(score))
                .or_insert(score);
        }
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> HashMap<i64, Vec<Edge>> {
        // sarah(1) -> acme(2) strength 1.0 -> beta(3) strength 0.8; gamma(4) isolated
        let mut adjacency = HashMap::new();
        adjacency.insert(1, vec![Edge { target: 2, strength: 1.0 }]);
        adjacency.insert(2, vec![Edge { target: 3, strength: 0.8 }]);
        adjacency
    }

    #[test]
    fn directly_mentioned_entity_scores_one() {
        let scores = graph_proximity_scores(&[1], &graph(), 2);
        assert_eq!(scores.get(&1), Some(&1.0));
    }

    #[test]
    fn one_hop_neighbor_gets_strength_scaled_score() {
        let scores = graph_proximity_scores(&[1], &graph(), 2);
        assert_eq!(scores.get(&2), Some(&0.8)); // 0.5 + 0.3 * 1.0
    }

    #[test]
    fn unreached_entity_is_absent_not_zero() {
        let scores = graph_proximity_scores(&[1], &graph(), 1);
        assert_eq!(scores.get(&4), None);
    }

    #[test]
    fn two_hop_neighbor_scores_lower_than_one_hop_but_is_present() {
        let scores = graph_proximity_scores(&[1], &graph(), 2);
        let one_hop = scores.get(&2).copied().unwrap();
        let two_hop = scores.get(&3).copied().unwrap();
        assert!(two_hop > 0.0);
        assert!(two_hop < one_hop);
        assert_eq!(two_hop, (0.5 + 0.3 * 0.8) * HOP_DECAY); // depth 2, edge strength 0.8
    }

    #[test]
    fn weak_edge_is_never_traversed() {
        let mut adjacency = HashMap::new();
        adjacency.insert(1, vec![Edge { target: 2, strength: 0.1 }]);
        let reachable = bfs_reachable(1, &adjacency, 3);
        assert!(reachable.is_empty());
    }

    #[test]
    fn origin_excluded_even_via_back_edge() {
        let mut adjacency = HashMap::new();
        adjacency.insert(1, vec![Edge { target: 2, strength: 0.9 }]);
        adjacency.insert(2, vec![Edge { target: 1, strength: 0.9 }]);
        let reachable = bfs_reachable(1, &adjacency, 3);
        assert!(!reachable.contains_key(&1));
    }

    #[test]
    fn depth_limit_is_respected() {
        let mut adjacency = HashMap::new();
        adjacency.insert(1, vec![Edge { target: 2, strength: 0.9 }]);
        adjacency.insert(2, vec![Edge { target: 3, strength: 0.9 }]);
        let reachable = bfs_reachable(1, &adjacency, 1);
        assert!(reachable.contains_key(&2));
        assert!(!reachable.contains_key(&3));
    }
}
