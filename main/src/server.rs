use std::sync::Arc;

use api_router::{api_routes, api_state::ApiState};
use common::{
    provider::AiProvider,
    storage::{
        db::SurrealDbClient, files::SourceFileStore, indexes::ensure_runtime_indexes,
        types::system_settings::SystemSettings,
    },
    utils::config::get_config,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    // The vector index dimension must agree with EMBED_DIM; refuse to start
    // against a store built with a different dimension.
    ensure_runtime_indexes(&db, config.embed_dim).await?;
    SystemSettings::ensure_compatible(&db, &config.openai_embed_model, config.embed_dim).await?;

    let files = SourceFileStore::new(&config)?;
    let provider = AiProvider::from_config(&config);
    info!(
        provider = ?config.ai_provider,
        embed_dim = config.embed_dim,
        "AI provider initialized"
    );

    let state = ApiState::new(db, files, provider, config.clone());
    let app = api_routes(state);

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    info!("Starting server listening on {serve_address}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
