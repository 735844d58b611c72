use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{api_state::ApiState, error::ApiError};

/// Enforces `X-API-Key` when a key is configured. Without a configured key
/// the instance is open (local development).
pub async fn api_auth(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.config.api_key.as_deref() {
        let presented = request
            .headers()
            .get("X-API-Key")
            .and_then(|value| value.to_str().ok());
        if presented != Some(expected) {
            return Err(ApiError::Unauthorized(
                "Missing or invalid API key".to_string(),
            ));
        }
    }
    Ok(next.run(request).await)
}
