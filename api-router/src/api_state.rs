use std::sync::Arc;

use common::{
    provider::AiProvider,
    storage::{db::SurrealDbClient, files::SourceFileStore},
    utils::config::AppConfig,
};

use crate::idempotency::IdempotencyLocks;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub files: SourceFileStore,
    pub provider: AiProvider,
    pub config: AppConfig,
    pub idempotency: IdempotencyLocks,
}

impl ApiState {
    pub fn new(
        db: Arc<SurrealDbClient>,
        files: SourceFileStore,
        provider: AiProvider,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            files,
            provider,
            config,
            idempotency: IdempotencyLocks::default(),
        }
    }
}
