pub mod hybrid;
pub mod mmr;
pub mod rerank;
pub mod scoring;

use common::{
    error::AppError, provider::AiProvider, storage::db::SurrealDbClient,
    storage::types::chunk::TextChunk, utils::config::AppConfig,
};
use tracing::instrument;

/// Sub-scores accumulated along the retrieval stack. Raw store scores are kept
/// next to their normalized forms so downstream stages can choose either.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Scores {
    pub vector_raw: Option<f32>,
    pub vector_norm: f32,
    pub lexical_raw: Option<f32>,
    pub lexical_norm: f32,
    pub hybrid: f32,
    pub rerank: Option<f32>,
}

/// A chunk that survived retrieval, with everything later stages need.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: TextChunk,
    pub scores: Scores,
}

impl RetrievedChunk {
    /// Relevance signal for diversification: rerank when it ran, hybrid
    /// otherwise.
    pub fn relevance(&self) -> f32 {
        self.scores.rerank.unwrap_or(self.scores.hybrid)
    }
}

/// Per-query retrieval options (the config gates still apply on top).
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub rerank: bool,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self { rerank: true }
    }
}

/// Full retrieval stack for one question: embed once, hybrid search, rerank,
/// MMR diversification. Returns at most `max_chunks_per_query` chunks in
/// selection order.
#[instrument(skip_all, fields(sources = source_ids.len()))]
pub async fn retrieve(
    db: &SurrealDbClient,
    provider: &AiProvider,
    question: &str,
    source_ids: &[String],
    options: RetrievalOptions,
    config: &AppConfig,
) -> Result<Vec<RetrievedChunk>, AppError> {
    let query_embedding = provider
        .embed(&[question.to_string()])
        .await?
        .pop()
        .ok_or_else(|| AppError::Provider("no embedding returned for question".into()))?;

    let candidates = hybrid::collect_candidates(
        db,
        query_embedding,
        question,
        source_ids,
        config.rerank_candidates,
        config.per_source_retrieval_limit,
    )
    .await?;

    let mut candidates = if options.rerank && config.rerank_enabled {
        rerank::rerank(question, candidates, config.rerank_snippet_chars)
    } else {
        candidates
    };

    let selected = if config.mmr_enabled {
        candidates.truncate(config.mmr_candidates);
        mmr::mmr_select(candidates, config.max_chunks_per_query, config.mmr_lambda)
    } else {
        candidates.truncate(config.max_chunks_per_query);
        candidates
    };

    Ok(selected)
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;

    use super::*;

    pub fn candidate(source_id: &str, ordinal: usize, scores: Scores) -> RetrievedChunk {
        candidate_with_text(source_id, ordinal, "chunk text", scores)
    }

    pub fn candidate_with_text(
        source_id: &str,
        ordinal: usize,
        text: &str,
        scores: Scores,
    ) -> RetrievedChunk {
        build(source_id, ordinal, text, vec![0.0; 4], scores)
    }

    pub fn candidate_with_embedding(
        source_id: &str,
        ordinal: usize,
        embedding: Vec<f32>,
        scores: Scores,
    ) -> RetrievedChunk {
        build(source_id, ordinal, "chunk text", embedding, scores)
    }

    fn build(
        source_id: &str,
        ordinal: usize,
        text: &str,
        embedding: Vec<f32>,
        scores: Scores,
    ) -> RetrievedChunk {
        let now = Utc::now();
        RetrievedChunk {
            chunk: TextChunk {
                id: format!("{source_id}-{ordinal}"),
                created_at: now,
                updated_at: now,
                source_id: source_id.to_string(),
                ordinal,
                page_start: Some(1),
                page_end: Some(1),
                section_path: vec![],
                text: text.to_string(),
                char_start: Some(ordinal * 100),
                char_end: Some(ordinal * 100 + text.len()),
                embedding,
            },
            scores,
        }
    }
}
