use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(IdempotencyRecord, "idempotency_key", {
    answer_id: String
});

impl IdempotencyRecord {
    /// Binds a client-supplied idempotency key to a completed answer. First
    /// writer wins; a replayed request re-reads the existing binding.
    pub async fn record(
        key: &str,
        answer_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let now = Utc::now();
        let record = Self {
            id: key.to_string(),
            created_at: now,
            updated_at: now,
            answer_id: answer_id.to_string(),
        };
        // An existing record means a concurrent duplicate already completed.
        let _ = db.store_item(record).await;
        Ok(())
    }

    pub async fn lookup(key: &str, db: &SurrealDbClient) -> Result<Option<String>, AppError> {
        let record: Option<Self> = db.get_item(key).await?;
        Ok(record.map(|r| r.answer_id))
    }
}
