use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

pub mod api_state;
pub mod error;
pub mod idempotency;
mod middleware_api_auth;
mod routes;

use api_state::ApiState;
use middleware_api_auth::api_auth;
use routes::{
    answers::{get_answer, get_answer_grouped, get_answer_highlights},
    health::{health, health_deps},
    query::{query, query_verified, query_verified_highlights},
    sources::{delete_source, get_source, ingest_source, list_sources, upload_source},
};

/// Full HTTP surface. Health probes stay open; everything else sits behind
/// the API-key middleware (a no-op when no key is configured).
pub fn api_routes(state: ApiState) -> Router {
    let upload_limit = state.config.max_pdf_bytes.saturating_add(1024 * 1024);

    let public = Router::new()
        .route("/health", get(health))
        .route("/health/deps", get(health_deps));

    let protected = Router::new()
        .route(
            "/sources/upload",
            post(upload_source).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/sources/ingest", post(ingest_source))
        .route("/sources", get(list_sources))
        .route("/sources/{id}", get(get_source).delete(delete_source))
        .route("/query", post(query))
        .route("/query/verified", post(query_verified))
        .route("/query/verified/highlights", post(query_verified_highlights))
        .route("/answers/{id}", get(get_answer))
        .route("/answers/{id}/grouped", get(get_answer_grouped))
        .route("/answers/{id}/highlights", get(get_answer_highlights))
        .route_layer(from_fn_with_state(state.clone(), api_auth));

    public.merge(protected).with_state(state)
}
