use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::utils::config::AiProviderKind;
use serde_json::json;

use crate::api_state::ApiState;

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Dependency probe: store reachability plus provider configuration.
pub async fn health_deps(State(state): State<ApiState>) -> impl IntoResponse {
    let store_ok = state.db.client.query("RETURN 1;").await.is_ok();
    let provider_ok = match state.config.ai_provider {
        AiProviderKind::Fake => true,
        AiProviderKind::Real => !state.config.openai_api_key.is_empty(),
    };

    let status = if store_ok && provider_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "status": if status == StatusCode::OK { "ok" } else { "degraded" },
        "deps": {
            "store": store_ok,
            "provider": provider_ok,
        },
    });
    (status, Json(body))
}
