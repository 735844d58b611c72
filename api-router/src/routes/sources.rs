use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use bytes::Bytes;
use common::{
    error::AppError,
    storage::types::{
        ingestion_task::IngestionTask,
        source::{Source, SourceStatus, SourceType},
    },
};
use ingestion_pipeline::extract::url::{ensure_ingestion_url_allowed, UrlGuardError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

/// Wire shape of a source row.
#[derive(Debug, Serialize)]
pub struct SourceOut {
    pub id: String,
    pub title: Option<String>,
    pub source_type: SourceType,
    pub original_filename: Option<String>,
    pub status: SourceStatus,
    pub error: Option<String>,
    pub ingest_task_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Source> for SourceOut {
    fn from(source: Source) -> Self {
        Self {
            id: source.id,
            title: source.title,
            source_type: source.source_type,
            original_filename: source.original_filename,
            status: source.status,
            error: source.error,
            ingest_task_id: source.ingest_task_id,
            created_at: source.created_at.to_rfc3339(),
            updated_at: source.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    #[form_data(limit = "unlimited")]
    pub file: FieldData<Bytes>,
    pub title: Option<String>,
}

/// `POST /sources/upload`: multipart PDF upload. The source row lands in
/// UPLOADED and an ingestion job is queued.
pub async fn upload_source(
    State(state): State<ApiState>,
    TypedMultipart(params): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    let file_name = params.file.metadata.file_name.clone().unwrap_or_default();
    let content_type = params
        .file
        .metadata
        .content_type
        .clone()
        .unwrap_or_default();

    let looks_like_pdf = content_type.eq_ignore_ascii_case("application/pdf")
        || file_name.to_ascii_lowercase().ends_with(".pdf");
    if !looks_like_pdf {
        return Err(ApiError::UnsupportedMediaType(
            "Only PDF uploads are supported".to_string(),
        ));
    }

    let payload = params.file.contents;
    if state.config.max_pdf_bytes > 0 && payload.len() > state.config.max_pdf_bytes {
        let max_mb = state.config.max_pdf_bytes as f64 / (1024.0 * 1024.0);
        return Err(ApiError::PayloadTooLarge(format!(
            "PDF exceeds max size of {max_mb:.1} MB"
        )));
    }

    let title = params.title.filter(|title| !title.trim().is_empty());
    let original_filename = (!file_name.is_empty()).then_some(file_name);
    let source = create_source(&state, title, SourceType::Pdf, original_filename, payload).await?;

    Ok((StatusCode::CREATED, Json(SourceOut::from(source))))
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub text: Option<String>,
    pub url: Option<String>,
    pub title: Option<String>,
}

/// `POST /sources/ingest`: pasted text or a URL, exactly one of the two.
pub async fn ingest_source(
    State(state): State<ApiState>,
    Json(request): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let text = request.text.filter(|text| !text.trim().is_empty());
    let url = request.url.filter(|url| !url.trim().is_empty());
    let title = request.title.filter(|title| !title.trim().is_empty());

    let source = match (text, url) {
        (Some(_), Some(_)) | (None, None) => {
            return Err(ApiError::BadRequest(
                "Provide exactly one of 'text' or 'url'".to_string(),
            ));
        }
        (Some(text), None) => {
            if state.config.max_text_bytes > 0 && text.len() > state.config.max_text_bytes {
                return Err(ApiError::PayloadTooLarge(format!(
                    "Text exceeds max size of {} bytes",
                    state.config.max_text_bytes
                )));
            }
            create_source(
                &state,
                title,
                SourceType::Text,
                None,
                Bytes::from(text.into_bytes()),
            )
            .await?
        }
        (None, Some(url)) => {
            let parsed = url::Url::parse(url.trim())
                .map_err(|_| ApiError::BadRequest("Invalid URL".to_string()))?;
            ensure_ingestion_url_allowed(&parsed, &state.config.allowed_url_hosts()).map_err(
                |err| match err {
                    UrlGuardError::HostNotAllowed(_) => ApiError::Forbidden(err.to_string()),
                    other => ApiError::BadRequest(other.to_string()),
                },
            )?;
            let trimmed = url.trim().to_string();
            create_source(
                &state,
                title,
                SourceType::Url,
                Some(trimmed.clone()),
                Bytes::from(trimmed.into_bytes()),
            )
            .await?
        }
    };

    Ok((StatusCode::CREATED, Json(SourceOut::from(source))))
}

async fn create_source(
    state: &ApiState,
    title: Option<String>,
    source_type: SourceType,
    original_filename: Option<String>,
    payload: Bytes,
) -> Result<Source, ApiError> {
    let source = Source::new(title, source_type, original_filename);
    state
        .files
        .put(&source.id, source_type.file_extension(), payload)
        .await
        .map_err(ApiError::from)?;
    state
        .db
        .store_item(source.clone())
        .await
        .map_err(AppError::Database)?;

    let task = IngestionTask::enqueue(source.id.clone(), &state.db).await?;
    Source::set_ingest_task_id(&source.id, &task.id, &state.db).await?;

    info!(source_id = %source.id, task_id = %task.id, "source accepted for ingestion");

    let mut source = source;
    source.ingest_task_id = Some(task.id);
    Ok(source)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub status: Option<String>,
    pub source_type: Option<String>,
}

pub async fn list_sources(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params.limit.unwrap_or(50).min(200);
    let offset = params.offset.unwrap_or(0);

    let status = params
        .status
        .as_deref()
        .map(parse_status)
        .transpose()?;
    let source_type = params
        .source_type
        .as_deref()
        .map(parse_source_type)
        .transpose()?;

    let sources = Source::list(&state.db, limit, offset, status, source_type).await?;
    let sources: Vec<SourceOut> = sources.into_iter().map(SourceOut::from).collect();
    Ok(Json(serde_json::json!({ "sources": sources })))
}

pub async fn get_source(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let source: Option<Source> = state.db.get_item(&id).await.map_err(AppError::Database)?;
    let source = source.ok_or_else(|| ApiError::NotFound(format!("source {id}")))?;
    Ok(Json(SourceOut::from(source)))
}

/// `DELETE /sources/{id}`: removes the source, its chunks, answers citing it,
/// and the stored payload file.
pub async fn delete_source(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Source::delete_cascade(&id, &state.db, &state.files).await?;
    info!(source_id = %id, "source deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn parse_status(raw: &str) -> Result<SourceStatus, ApiError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "UPLOADED" => Ok(SourceStatus::Uploaded),
        "PROCESSING" => Ok(SourceStatus::Processing),
        "READY" => Ok(SourceStatus::Ready),
        "FAILED" => Ok(SourceStatus::Failed),
        other => Err(ApiError::BadRequest(format!("Unknown status: {other}"))),
    }
}

fn parse_source_type(raw: &str) -> Result<SourceType, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pdf" => Ok(SourceType::Pdf),
        "text" => Ok(SourceType::Text),
        "url" => Ok(SourceType::Url),
        other => Err(ApiError::BadRequest(format!("Unknown source_type: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(parse_status("ready").unwrap(), SourceStatus::Ready);
        assert_eq!(parse_status(" FAILED ").unwrap(), SourceStatus::Failed);
        assert!(parse_status("nope").is_err());
    }

    #[test]
    fn source_type_parsing() {
        assert_eq!(parse_source_type("PDF").unwrap(), SourceType::Pdf);
        assert_eq!(parse_source_type("url").unwrap(), SourceType::Url);
        assert!(parse_source_type("docx").is_err());
    }
}
