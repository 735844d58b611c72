use crate::{scoring::min_max_normalize, RetrievedChunk};

/// Cosine similarity; zero when either vector has no magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Maximal marginal relevance selection over chunk embeddings:
/// `score = λ·relevance − (1−λ)·max_sim(candidate, selected)`.
/// Relevance is the rerank score when present, the hybrid score otherwise,
/// min-max normalized over the pool. Output preserves selection order and all
/// tie-breaks favor the earlier candidate, keeping selection deterministic.
pub fn mmr_select(
    candidates: Vec<RetrievedChunk>,
    k: usize,
    lambda: f32,
) -> Vec<RetrievedChunk> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let relevance_raw: Vec<f32> = candidates
        .iter()
        .map(|candidate| {
            candidate
                .scores
                .rerank
                .unwrap_or(candidate.scores.hybrid)
        })
        .collect();
    let relevance = min_max_normalize(&relevance_raw);

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected_indices: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));

    while selected_indices.len() < k && !remaining.is_empty() {
        let mut best_position = 0usize;
        let mut best_score = f32::MIN;
        for (position, &idx) in remaining.iter().enumerate() {
            let redundancy = selected_indices
                .iter()
                .map(|&chosen| {
                    cosine_similarity(
                        &candidates[idx].chunk.embedding,
                        &candidates[chosen].chunk.embedding,
                    )
                })
                .fold(0.0f32, f32::max);
            let score = lambda * relevance[idx] - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_position = position;
            }
        }
        selected_indices.push(remaining.remove(best_position));
    }

    let mut keep: Vec<Option<RetrievedChunk>> = candidates.into_iter().map(Some).collect();
    selected_indices
        .into_iter()
        .filter_map(|idx| keep[idx].take())
        .collect()
}
