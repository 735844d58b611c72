use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(AnswerRecord, "answer", {
    query_id: String,
    #[serde(default)]
    source_ids: Vec<String>,
    answer_text: String,
    #[serde(default)]
    raw_citations: serde_json::Value
});

impl AnswerRecord {
    pub fn new(
        query_id: String,
        source_ids: Vec<String>,
        answer_text: String,
        raw_citations: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            query_id,
            source_ids,
            answer_text,
            raw_citations,
        }
    }

    /// Cascade helper: removes every persisted answer that drew on a source.
    pub async fn delete_by_source_id(
        source_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE answer WHERE source_ids CONTAINS $source_id")
            .bind(("source_id", source_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }
}
