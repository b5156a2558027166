//! Score normalization and weighted fusion of the two rankings
//!
//! BM25 raw scores come from SQLite's `bm25()` where *lower is better*
//! (more negative = more relevant). Cosine distances lie in [0, 2] with
//! lower = closer. Both are brought onto a common [0, 1] scale where higher
//! is better, then combined linearly with caller-supplied weights.

use std::collections::HashMap;

/// Per-chunk score breakdown after fusion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedScore {
    pub bm25: f32,
    pub semantic: f32,
    pub final_score: f32,
}

/// Min-max normalize raw BM25 scores onto [0, 1].
///
/// The most negative raw score maps to 1.0 and the worst to 0.0. When every
/// candidate scored the same (including a single candidate), all normalize
/// to 1.0 rather than being zeroed by a degenerate range.
pub fn normalize_bm25(raw: &HashMap<i64, f32>) -> HashMap<i64, f32> {
    if raw.is_empty() {
        return HashMap::new();
    }

    let min = raw.values().cloned().fold(f32::INFINITY, f32::min);
    let max = raw.values().cloned().fold(f32::NEG_INFINITY, f32::max);
    if min == max {
        return raw.keys().map(|&id| (id, 1.0)).collect();
    }

    let range = max - min;
    raw.iter().map(|(&id, &s)| (id, (max - s) / range)).collect()
}

/// Convert cosine distances to similarities and min-max normalize onto [0, 1].
///
/// `1 - d/2` is a valid similarity since cosine distance is bounded by
/// [0, 2]. The all-equal fallback to 1.0 matches [`normalize_bm25`].
pub fn normalize_distances(raw: &HashMap<i64, f32>) -> HashMap<i64, f32> {
    if raw.is_empty() {
        return HashMap::new();
    }

    let similarities: HashMap<i64, f32> =
        raw.iter().map(|(&id, &d)| (id, 1.0 - d / 2.0)).collect();

    let min = similarities.values().cloned().fold(f32::INFINITY, f32::min);
    let max = similarities.values().cloned().fold(f32::NEG_INFINITY, f32::max);
    if min == max {
        return similarities.keys().map(|&id| (id, 1.0)).collect();
    }

    let range = max - min;
    similarities
        .into_iter()
        .map(|(id, s)| (id, (s - min) / range))
        .collect()
}

/// Linearly combine two normalized rankings.
///
/// Operates on the union of ids: a chunk found by only one ranking
/// contributes 0.0 for the other term, it is not excluded. Weights need not
/// sum to 1. Results sort by final score descending, with id ascending as
/// the deterministic tie-break.
pub fn fuse(
    bm25_norm: &HashMap<i64, f32>,
    semantic_norm: &HashMap<i64, f32>,
    keyword_weight: f32,
    semantic_weight: f32,
) -> Vec<(i64, FusedScore)> {
    let mut ids: Vec<i64> = bm25_norm.keys().chain(semantic_norm.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let mut fused: Vec<(i64, FusedScore)> = ids
        .into_iter()
        .map(|id| {
            let bm25 = bm25_norm.get(&id).copied().unwrap_or(0.0);
            let semantic = semantic_norm.get(&id).copied().unwrap_or(0.0);
            let final_score = keyword_weight * bm25 + semantic_weight * semantic;
            (id, FusedScore { bm25, semantic, final_score })
        })
        .collect();

    // Stable sort on a pre-sorted-by-id vector keeps ties in id order
    fused.sort_by(|a, b| {
        b.1.final_score
            .partial_cmp(&a.1.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    fused
}
