use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("Upstream provider failed")]
    BadGateway(String),
    #[error("Request deadline exceeded")]
    Timeout,
    #[error("Internal server error")]
    Internal(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => Self::BadRequest(msg),
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Auth(msg) => Self::Unauthorized(msg),
            AppError::RateLimited(msg) => Self::RateLimited(msg),
            AppError::Provider(msg) => Self::BadGateway(msg),
            AppError::Timeout(_) => Self::Timeout,
            other => Self::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail, internal) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone(), None),
            Self::UnsupportedMediaType(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg.clone(), None)
            }
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone(), None),
            Self::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, msg.clone(), None),
            Self::BadGateway(internal) => (
                StatusCode::BAD_GATEWAY,
                "Upstream provider failed".to_string(),
                Some(internal.clone()),
            ),
            Self::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "Request deadline exceeded".to_string(),
                None,
            ),
            Self::Internal(internal) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(internal.clone()),
            ),
        };

        // Server-side failures get an error id the client can quote; the
        // underlying cause stays in the logs.
        let error_id = internal.map(|cause| {
            let error_id = Uuid::new_v4().to_string();
            tracing::error!(error_id = %error_id, cause = %cause, "request failed");
            error_id
        });

        (status, Json(ErrorBody { detail, error_id })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: ApiError) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn app_error_mapping() {
        assert!(matches!(
            ApiError::from(AppError::Validation("bad".into())),
            ApiError::BadRequest(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::NotFound("missing".into())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::Provider("down".into())),
            ApiError::BadGateway(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::Timeout("late".into())),
            ApiError::Timeout
        ));
        assert!(matches!(
            ApiError::from(AppError::Citation("hallucinated".into())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn status_codes() {
        assert_eq!(status_of(ApiError::BadRequest("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ApiError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(ApiError::UnsupportedMediaType("x".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status_of(ApiError::Unprocessable("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_of(ApiError::Timeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_of(ApiError::BadGateway("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(ApiError::Internal("secret detail".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let error = ApiError::Internal("db password incorrect".into());
        assert_eq!(error.to_string(), "Internal server error");
    }
}
