use std::sync::Arc;

use common::{
    provider::AiProvider,
    storage::{
        db::SurrealDbClient, files::SourceFileStore, indexes::ensure_runtime_indexes,
        types::system_settings::SystemSettings,
    },
    utils::config::get_config,
};
use ingestion_pipeline::{pipeline::IngestionPipeline, run_worker_loop};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
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
    let ingestion_pipeline = Arc::new(IngestionPipeline::new(
        db.clone(),
        provider,
        files,
        config,
    ));

    run_worker_loop(db, ingestion_pipeline).await
}
