use std::collections::HashMap;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::chunk::{TextChunk, TextChunkSearchResult},
    },
};
use tracing::debug;

use crate::{
    scoring::{hybrid_blend, min_max_normalize, sort_by_hybrid_desc},
    RetrievedChunk, Scores,
};

/// Runs vector and lexical search side by side, applies the optional
/// per-source quota inside each list, and fuses the two into hybrid-scored
/// candidates capped at `take`.
pub async fn collect_candidates(
    db: &SurrealDbClient,
    query_embedding: Vec<f32>,
    question: &str,
    source_ids: &[String],
    take: usize,
    per_source_limit: Option<usize>,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let (vector_hits, lexical_hits) = tokio::join!(
        TextChunk::vector_search(take, query_embedding, source_ids, db),
        TextChunk::fts_search(take, question, source_ids, db),
    );
    let mut vector_hits = vector_hits?;
    let mut lexical_hits = lexical_hits?;

    if !source_ids.is_empty() {
        if let Some(limit) = per_source_limit {
            vector_hits = apply_per_source_quota(vector_hits, limit);
            lexical_hits = apply_per_source_quota(lexical_hits, limit);
        }
    }

    debug!(
        vector = vector_hits.len(),
        lexical = lexical_hits.len(),
        "hybrid search returned candidates"
    );

    let vector_norms = min_max_normalize(
        &vector_hits.iter().map(|hit| hit.score).collect::<Vec<_>>(),
    );
    let lexical_norms = min_max_normalize(
        &lexical_hits.iter().map(|hit| hit.score).collect::<Vec<_>>(),
    );

    let mut merged: HashMap<String, RetrievedChunk> = HashMap::new();
    for (hit, norm) in vector_hits.into_iter().zip(vector_norms) {
        let entry = merged
            .entry(hit.chunk.id.clone())
            .or_insert_with(|| RetrievedChunk {
                chunk: hit.chunk.clone(),
                scores: Scores::default(),
            });
        entry.scores.vector_raw = Some(hit.score);
        entry.scores.vector_norm = norm;
    }
    for (hit, norm) in lexical_hits.into_iter().zip(lexical_norms) {
        let entry = merged
            .entry(hit.chunk.id.clone())
            .or_insert_with(|| RetrievedChunk {
                chunk: hit.chunk.clone(),
                scores: Scores::default(),
            });
        entry.scores.lexical_raw = Some(hit.score);
        entry.scores.lexical_norm = norm;
    }

    let mut candidates: Vec<RetrievedChunk> = merged.into_values().collect();
    for candidate in &mut candidates {
        candidate.scores.hybrid =
            hybrid_blend(candidate.scores.vector_norm, candidate.scores.lexical_norm);
    }

    sort_by_hybrid_desc(&mut candidates);
    candidates.truncate(take);
    Ok(candidates)
}

/// Keeps at most `limit` hits per source, preserving score order. Best
/// effort: fairness across wildly imbalanced sources is not guaranteed.
fn apply_per_source_quota(
    hits: Vec<TextChunkSearchResult>,
    limit: usize,
) -> Vec<TextChunkSearchResult> {
    if limit == 0 {
        return hits;
    }
    let mut counts: HashMap<String, usize> = HashMap::new();
    hits.into_iter()
        .filter(|hit| {
            let count = counts.entry(hit.chunk.source_id.clone()).or_insert(0);
            *count += 1;
            *count <= limit
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::indexes::{ensure_runtime_indexes, rebuild_indexes};
    use uuid::Uuid;

    const DIM: usize = 4;

    fn chunk(source_id: &str, ordinal: usize, text: &str, embedding: Vec<f32>) -> TextChunk {
        TextChunk::new(
            source_id.to_string(),
            ordinal,
            Some(1),
            Some(1),
            vec![],
            text.to_string(),
            ordinal * 50,
            ordinal * 50 + text.len(),
            embedding,
        )
    }

    fn hit(source_id: &str, ordinal: usize, score: f32) -> TextChunkSearchResult {
        TextChunkSearchResult {
            chunk: chunk(source_id, ordinal, "text", vec![0.0; DIM]),
            score,
        }
    }

    #[test]
    fn quota_caps_hits_per_source() {
        let hits = vec![
            hit("a", 0, 0.9),
            hit("a", 1, 0.8),
            hit("a", 2, 0.7),
            hit("b", 0, 0.6),
        ];
        let capped = apply_per_source_quota(hits, 2);
        assert_eq!(capped.len(), 3);
        assert_eq!(
            capped
                .iter()
                .filter(|hit| hit.chunk.source_id == "a")
                .count(),
            2
        );
    }

    #[test]
    fn quota_of_zero_disables_the_cap() {
        let hits = vec![hit("a", 0, 0.9), hit("a", 1, 0.8)];
        assert_eq!(apply_per_source_quota(hits, 0).len(), 2);
    }

    #[tokio::test]
    async fn candidates_merge_both_signals() {
        let db = SurrealDbClient::memory("hybrid_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        ensure_runtime_indexes(&db, DIM).await.expect("indexes");

        // One chunk matches the query vector, another matches lexically, a
        // third matches both and should outrank them.
        let golden = chunk(
            "src",
            0,
            "tokio scheduler internals explained",
            vec![1.0, 0.0, 0.0, 0.0],
        );
        let vector_only = chunk("src", 1, "completely different topic", vec![0.9, 0.1, 0.0, 0.0]);
        let lexical_only = chunk(
            "src",
            2,
            "the scheduler again, lexically relevant",
            vec![0.0, 0.0, 1.0, 0.0],
        );
        let golden_id = golden.id.clone();
        TextChunk::replace_for_source("src", vec![golden, vector_only, lexical_only], &db)
            .await
            .expect("insert");
        rebuild_indexes(&db).await.expect("rebuild");

        let candidates = collect_candidates(
            &db,
            vec![1.0, 0.0, 0.0, 0.0],
            "scheduler",
            &[],
            10,
            None,
        )
        .await
        .expect("collect");

        assert!(!candidates.is_empty());
        assert_eq!(candidates[0].chunk.id, golden_id);
        assert!(candidates[0].scores.vector_raw.is_some());
        assert!(candidates[0].scores.lexical_raw.is_some());
    }

    #[tokio::test]
    async fn candidates_are_capped_at_take() {
        let db = SurrealDbClient::memory("hybrid_cap_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        ensure_runtime_indexes(&db, DIM).await.expect("indexes");

        let chunks: Vec<TextChunk> = (0..6)
            .map(|i| {
                chunk(
                    "src",
                    i,
                    "repeated filler text",
                    vec![1.0, i as f32 * 0.01, 0.0, 0.0],
                )
            })
            .collect();
        TextChunk::replace_for_source("src", chunks, &db)
            .await
            .expect("insert");

        let candidates =
            collect_candidates(&db, vec![1.0, 0.0, 0.0, 0.0], "nomatchterm", &[], 3, None)
                .await
                .expect("collect");
        assert!(candidates.len() <= 3);
    }
}
