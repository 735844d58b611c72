use std::cmp::Ordering;

use crate::RetrievedChunk;

/// Blend factor between normalized vector and lexical scores.
pub const HYBRID_ALPHA: f32 = 0.5;

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Min-max normalization to [0,1] within one result list. Constant lists map
/// to 1.0 so a single strong signal is not erased.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for score in scores {
        if !score.is_finite() {
            continue;
        }
        if *score < min {
            min = *score;
        }
        if *score > max {
            max = *score;
        }
    }

    if !min.is_finite() || !max.is_finite() {
        return vec![0.0; scores.len()];
    }

    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| {
            if score.is_finite() {
                clamp_unit((score - min) / (max - min))
            } else {
                0.0
            }
        })
        .collect()
}

/// Linear fusion of the normalized sub-scores.
pub fn hybrid_blend(vector_norm: f32, lexical_norm: f32) -> f32 {
    clamp_unit(HYBRID_ALPHA * vector_norm + (1.0 - HYBRID_ALPHA) * lexical_norm)
}

/// Orders candidates by hybrid score, breaking ties by raw vector score, then
/// source id, then chunk ordinal. The ordering is total, so retrieval output
/// is deterministic for a fixed corpus state.
pub fn sort_by_hybrid_desc(candidates: &mut [RetrievedChunk]) {
    candidates.sort_by(compare_hybrid);
}

fn compare_hybrid(a: &RetrievedChunk, b: &RetrievedChunk) -> Ordering {
    b.scores
        .hybrid
        .partial_cmp(&a.scores.hybrid)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            let a_vec = a.scores.vector_raw.unwrap_or(f32::MIN);
            let b_vec = b.scores.vector_raw.unwrap_or(f32::MIN);
            b_vec.partial_cmp(&a_vec).unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.chunk.source_id.cmp(&b.chunk.source_id))
        .then_with(|| a.chunk.ordinal.cmp(&b.chunk.ordinal))
}
