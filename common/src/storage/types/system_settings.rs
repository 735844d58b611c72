use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

const SETTINGS_ID: &str = "current";

stored_object!(SystemSettings, "system_settings", {
    embedding_model: String,
    embedding_dimensions: usize
});

impl SystemSettings {
    /// Records the embedding configuration on first boot and verifies it on
    /// every later one. A dimension change would silently corrupt the vector
    /// index, so startup fails instead.
    pub async fn ensure_compatible(
        db: &SurrealDbClient,
        embedding_model: &str,
        embedding_dimensions: usize,
    ) -> Result<Self, AppError> {
        let existing: Option<Self> = db.get_item(SETTINGS_ID).await?;
        match existing {
            Some(settings) => {
                if settings.embedding_dimensions != embedding_dimensions {
                    return Err(AppError::Validation(format!(
                        "EMBED_DIM is {embedding_dimensions} but the store was built with {}; \
                         re-ingest sources before changing the embedding dimension",
                        settings.embedding_dimensions
                    )));
                }
                Ok(settings)
            }
            None => {
                let now = Utc::now();
                let settings = Self {
                    id: SETTINGS_ID.to_string(),
                    created_at: now,
                    updated_at: now,
                    embedding_model: embedding_model.to_string(),
                    embedding_dimensions,
                };
                db.store_item(settings.clone()).await?;
                Ok(settings)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn first_boot_records_then_verifies() {
        let db = SurrealDbClient::memory("settings_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");

        let recorded = SystemSettings::ensure_compatible(&db, "text-embedding-3-small", 1536)
            .await
            .expect("first boot");
        assert_eq!(recorded.embedding_dimensions, 1536);

        SystemSettings::ensure_compatible(&db, "text-embedding-3-small", 1536)
            .await
            .expect("same dimension passes");

        let mismatch = SystemSettings::ensure_compatible(&db, "text-embedding-3-small", 768).await;
        assert!(matches!(mismatch, Err(AppError::Validation(_))));
    }
}
