use std::{collections::HashMap, time::Duration};

use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use common::{
    error::AppError,
    storage::types::{
        answer::AnswerRecord,
        idempotency::IdempotencyRecord,
        source::{Source, SourceStatus},
        user_query::UserQuery,
    },
    utils::fingerprint::QueryModes,
};
use retrieval_pipeline::{retrieve, RetrievalOptions, RetrievedChunk};
use serde::Deserialize;
use synthesis_pipeline::{
    highlights::add_highlights,
    hydration::{build_raw_citations, hydrate_answer},
    rewrite::rewrite_answer,
    synthesizer::{expand_citations, generate_answer},
    types::VerificationSummary,
    verify::{summarize_claims, verify_answer},
    AnswerResponse,
};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub source_ids: Option<Vec<String>>,
    pub rerank: Option<bool>,
}

pub async fn query(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    run_query(
        state,
        headers,
        request,
        QueryOptions {
            verify: false,
            highlights: false,
        },
    )
    .await
}

pub async fn query_verified(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    run_query(
        state,
        headers,
        request,
        QueryOptions {
            verify: true,
            highlights: false,
        },
    )
    .await
}

pub async fn query_verified_highlights(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    run_query(
        state,
        headers,
        request,
        QueryOptions {
            verify: true,
            highlights: true,
        },
    )
    .await
}

#[derive(Debug, Clone, Copy)]
struct QueryOptions {
    verify: bool,
    highlights: bool,
}

async fn run_query(
    state: ApiState,
    headers: HeaderMap,
    request: QueryRequest,
    options: QueryOptions,
) -> Result<Json<AnswerResponse>, ApiError> {
    let question = request.question.trim().to_string();
    if question.is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".into()));
    }

    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    // Serialize concurrent duplicates per key; replays short-circuit to the
    // stored answer.
    let _guard = match &idempotency_key {
        Some(key) => Some(state.idempotency.acquire(key).await),
        None => None,
    };
    if let Some(key) = &idempotency_key {
        if let Some(answer_id) = IdempotencyRecord::lookup(key, &state.db).await? {
            let record: Option<AnswerRecord> = state
                .db
                .get_item(&answer_id)
                .await
                .map_err(AppError::Database)?;
            if let Some(record) = record {
                info!(%answer_id, "idempotent replay served from store");
                return Ok(Json(hydrate_answer(&record, false, options.highlights)));
            }
        }
    }

    let deadline = Duration::from_secs(state.config.request_timeout_secs);
    let response = tokio::time::timeout(
        deadline,
        answer_question(&state, &question, request, options),
    )
    .await
    .map_err(|_| ApiError::Timeout)??;

    if let Some(key) = &idempotency_key {
        IdempotencyRecord::record(key, &response.answer_id, &state.db).await?;
    }

    Ok(Json(response))
}

async fn answer_question(
    state: &ApiState,
    question: &str,
    request: QueryRequest,
    options: QueryOptions,
) -> Result<AnswerResponse, ApiError> {
    let (source_ids, titles) = resolve_sources(state, request.source_ids).await?;

    let modes = QueryModes {
        rerank: request.rerank.unwrap_or(true),
        verify: options.verify,
        highlights: options.highlights,
    };

    let retrieved: Vec<RetrievedChunk> = retrieve(
        &state.db,
        &state.provider,
        question,
        &source_ids,
        RetrievalOptions {
            rerank: modes.rerank,
        },
        &state.config,
    )
    .await?;

    let synthesis = generate_answer(
        &state.provider,
        question,
        &retrieved,
        &titles,
        state.config.debug,
    )
    .await?;

    let citations = expand_citations(
        question,
        &synthesis.cited_ids,
        &retrieved,
        &titles,
        state.config.rerank_snippet_chars,
    );

    let (answer_text, style, summary, claims) = if options.verify {
        let mut claims = verify_answer(
            &state.provider,
            question,
            &synthesis.answer_text,
            &retrieved,
            &synthesis.cited_ids,
        )
        .await?;
        if options.highlights {
            add_highlights(&mut claims, &retrieved);
        }
        let mut summary = summarize_claims(&claims, &synthesis.answer_text);
        let (answer_text, style) = rewrite_answer(&synthesis.answer_text, &claims, &mut summary);
        (answer_text, style, summary, claims)
    } else {
        let style = synthesis.style;
        (
            synthesis.answer_text.clone(),
            style,
            VerificationSummary::neutral(style),
            Vec::new(),
        )
    };

    let query_row = UserQuery::new(question.to_string(), source_ids.clone(), modes);
    state
        .db
        .store_item(query_row.clone())
        .await
        .map_err(AppError::Database)?;

    let raw_citations =
        build_raw_citations(&synthesis.cited_ids, &citations, &claims, &summary, style);
    let record = AnswerRecord::new(query_row.id.clone(), source_ids, answer_text, raw_citations);
    state
        .db
        .store_item(record.clone())
        .await
        .map_err(AppError::Database)?;

    info!(
        query_id = %query_row.id,
        answer_id = %record.id,
        citations = citations.len(),
        claims = claims.len(),
        "query completed"
    );

    Ok(hydrate_answer(&record, false, options.highlights))
}

/// Resolves the allowed source set. `None` means every READY source; an
/// explicit empty list is a client error; requested ids must name at least
/// one READY source.
async fn resolve_sources(
    state: &ApiState,
    requested: Option<Vec<String>>,
) -> Result<(Vec<String>, HashMap<String, Option<String>>), ApiError> {
    match requested {
        Some(ids) if ids.is_empty() => Err(ApiError::BadRequest(
            "source_ids must not be empty when provided".into(),
        )),
        Some(ids) => {
            let mut ready: Vec<String> = Vec::new();
            let mut titles = HashMap::new();
            for id in &ids {
                let source: Option<Source> =
                    state.db.get_item(id).await.map_err(AppError::Database)?;
                if let Some(source) = source {
                    if source.status == SourceStatus::Ready {
                        ready.push(source.id.clone());
                        titles.insert(source.id.clone(), source.title.clone());
                    }
                }
            }
            if ready.is_empty() {
                return Err(ApiError::Unprocessable(
                    "none of the requested sources are READY".into(),
                ));
            }
            Ok((ready, titles))
        }
        None => {
            let sources = Source::list(&state.db, 1000, 0, Some(SourceStatus::Ready), None).await?;
            if sources.is_empty() {
                return Err(ApiError::Unprocessable("no READY sources exist".into()));
            }
            let mut titles = HashMap::new();
            let mut ids = Vec::with_capacity(sources.len());
            for source in sources {
                titles.insert(source.id.clone(), source.title.clone());
                ids.push(source.id);
            }
            Ok((ids, titles))
        }
    }
}
