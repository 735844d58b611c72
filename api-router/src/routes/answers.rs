use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use common::{error::AppError, storage::types::answer::AnswerRecord};
use synthesis_pipeline::hydration::hydrate_answer;

use crate::{api_state::ApiState, error::ApiError};

pub async fn get_answer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = load(&state, &id).await?;
    Ok(Json(hydrate_answer(&record, false, false)))
}

pub async fn get_answer_grouped(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = load(&state, &id).await?;
    Ok(Json(hydrate_answer(&record, true, false)))
}

pub async fn get_answer_highlights(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = load(&state, &id).await?;
    Ok(Json(hydrate_answer(&record, false, true)))
}

async fn load(state: &ApiState, id: &str) -> Result<AnswerRecord, ApiError> {
    let record: Option<AnswerRecord> =
        state.db.get_item(id).await.map_err(AppError::Database)?;
    record.ok_or_else(|| ApiError::NotFound(format!("answer {id}")))
}
