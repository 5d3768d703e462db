//! Signal fusion for hybrid recall: Reciprocal Rank Fusion across an arbitrary
//! number of named signals, and the weighted linear-combination fallback.

use std::collections::HashMap;

/// Combines any number of named rank-ordered signals into one score per id.
///
/// `score(id) = sum over signals of 1/(k + rank)`, where `rank` is the id's
/// 0-based position in that signal's ranking. An id absent from a signal's
/// ranking contributes 0 for that signal. `candidate_ids` with no signal
/// mentioning them score 0.0 and are still present in the result map.
pub fn reciprocal_rank_fusion(
    candidate_ids: &[i64],
    signal_rankings: &HashMap<String, Vec<i64>>,
    k: f64,
) -> HashMap<i64, f64> {
    let mut scores: HashMap<i64, f64> = candidate_ids.iter().map(|&id| (id, 0.0)).collect();

    for ranking in signal_rankings.values() {
        for (rank, &id) in ranking.iter().enumerate() {
            if let Some(score) = scores.get_mut(&id) {
                *score += 1.0 / (k + rank as f64);
            }
        }
    }

    scores
}

/// Weighted linear combination of named, already-normalized `[0, 1]` signal
/// scores per id. Missing signals contribute 0 for that id.
pub fn linear_combination(candidate_ids: &[i64], signal_scores: &HashMap<String, HashMap<i64, f64>>, weights: &HashMap<String, f64>) -> HashMap<i64, f64> {
    let mut scores: HashMap<i64, f64> = candidate_ids.iter().map(|&id| (id, 0.0)).collect();

    for (signal, weight) in weights {
        let Some(per_id) = signal_scores.get(signal) else { continue };
        for &id in candidate_ids {
            if let Some(value) = per_id.get(&id) {
                *scores.entry(id).or_default() += value * weight;
            }
        }
    }

    scores
}

/// Cosine similarity between two equal-length dense vectors. Returns 0.0 if
/// either vector has zero magnitude (rather than dividing by zero).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

/// Exponential recency decay with the given half-life (in days).
pub fn recency_score(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 0.0;
    }
    0.5f64.powf(age_days / half_life_days)
}
