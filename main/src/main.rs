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
use ingestion_pipeline::{pipeline::IngestionPipeline, run_worker_loop};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Combined binary: API server plus ingestion worker in one process. The
/// dedicated `server` and `worker` binaries exist for split deployments.
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

    ensure_runtime_indexes(&db, config.embed_dim).await?;
    SystemSettings::ensure_compatible(&db, &config.openai_embed_model, config.embed_dim).await?;

    let files = SourceFileStore::new(&config)?;
    let provider = AiProvider::from_config(&config);

    let state = ApiState::new(
        db.clone(),
        files.clone(),
        provider.clone(),
        config.clone(),
    );
    let app = api_routes(state);

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    info!("Starting server listening on {serve_address}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    let server = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!("Server error: {err}");
        }
    });

    let ingestion_pipeline = Arc::new(IngestionPipeline::new(db.clone(), provider, files, config));
    info!("Starting worker loop");
    if let Err(err) = run_worker_loop(db, ingestion_pipeline).await {
        error!("Worker process error: {err}");
    }

    server.await?;
    Ok(())
}
