use uuid::Uuid;

use crate::{
    error::AppError,
    storage::{db::SurrealDbClient, files::SourceFileStore},
    stored_object,
};

use super::{answer::AnswerRecord, chunk::TextChunk};

/// Kind of ingested content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Text,
    Url,
}

impl SourceType {
    /// Extension of the stored payload under the storage root.
    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
            Self::Url => "url",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceStatus {
    Uploaded,
    Processing,
    Ready,
    Failed,
}

stored_object!(Source, "source", {
    title: Option<String>,
    source_type: SourceType,
    original_filename: Option<String>,
    status: SourceStatus,
    error: Option<String>,
    ingest_task_id: Option<String>
});

impl Source {
    pub fn new(
        title: Option<String>,
        source_type: SourceType,
        original_filename: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            title,
            source_type,
            original_filename,
            status: SourceStatus::Uploaded,
            error: None,
            ingest_task_id: None,
        }
    }

    /// Claims the source for ingestion. Returns `None` when the current status
    /// is neither UPLOADED nor PROCESSING, in which case the caller must not
    /// redo any work: the source is already done, failed, or deleted.
    pub async fn try_mark_processing(
        id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "UPDATE type::thing('source', $id)
                 SET status = 'PROCESSING', error = NONE, updated_at = time::now()
                 WHERE status IN ['UPLOADED', 'PROCESSING']
                 RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// PROCESSING -> READY. A no-op when the source moved elsewhere meanwhile.
    pub async fn mark_ready(id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('source', $id)
                 SET status = 'READY', error = NONE, updated_at = time::now()
                 WHERE status = 'PROCESSING'",
            )
            .bind(("id", id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    /// PROCESSING -> FAILED with a human-readable error.
    pub async fn mark_failed(
        id: &str,
        error: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let trimmed = error.trim();
        let cut = crate::utils::text::floor_char_boundary(trimmed, 500);
        let truncated = trimmed[..cut].to_string();
        db.client
            .query(
                "UPDATE type::thing('source', $id)
                 SET status = 'FAILED', error = $error, updated_at = time::now()
                 WHERE status IN ['UPLOADED', 'PROCESSING']",
            )
            .bind(("id", id.to_string()))
            .bind(("error", truncated))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn set_ingest_task_id(
        id: &str,
        task_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('source', $id)
                 SET ingest_task_id = $task_id, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("task_id", task_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    pub async fn list(
        db: &SurrealDbClient,
        limit: usize,
        offset: usize,
        status: Option<SourceStatus>,
        source_type: Option<SourceType>,
    ) -> Result<Vec<Self>, AppError> {
        let mut conditions: Vec<&str> = Vec::new();
        if status.is_some() {
            conditions.push("status = $status");
        }
        if source_type.is_some() {
            conditions.push("source_type = $source_type");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM source {where_clause} ORDER BY created_at DESC LIMIT $limit START $offset"
        );
        let mut query = db
            .client
            .query(sql)
            .bind(("limit", limit as i64))
            .bind(("offset", offset as i64));
        if let Some(status) = status {
            query = query.bind(("status", status));
        }
        if let Some(source_type) = source_type {
            query = query.bind(("source_type", source_type));
        }

        let mut response = query.await?;
        Ok(response.take(0)?)
    }

    /// Ids of all sources that finished ingestion.
    pub async fn ready_ids(db: &SurrealDbClient) -> Result<Vec<String>, AppError> {
        #[derive(serde::Deserialize)]
        struct Row {
            #[serde(deserialize_with = "deserialize_flexible_id")]
            id: String,
        }

        let mut response = db
            .client
            .query("SELECT id FROM source WHERE status = 'READY'")
            .await?;
        let rows: Vec<Row> = response.take(0)?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    /// Removes the source and everything hanging off it: chunks, persisted
    /// answers that cite it, and the stored payload file.
    pub async fn delete_cascade(
        id: &str,
        db: &SurrealDbClient,
        files: &SourceFileStore,
    ) -> Result<(), AppError> {
        let source: Option<Self> = db.get_item(id).await?;
        let Some(source) = source else {
            return Err(AppError::NotFound(format!("source {id}")));
        };

        TextChunk::delete_by_source_id(id, db).await?;
        AnswerRecord::delete_by_source_id(id, db).await?;
        files.delete(id, source.source_type.file_extension()).await?;
        db.delete_item::<Self>(id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SurrealDbClient {
        SurrealDbClient::memory("source_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb")
    }

    #[tokio::test]
    async fn processing_claim_requires_uploaded_or_processing() {
        let db = test_db().await;
        let source = Source::new(Some("doc".into()), SourceType::Text, None);
        let id = source.id.clone();
        db.store_item(source).await.expect("store");

        let claimed = Source::try_mark_processing(&id, &db).await.expect("claim");
        assert_eq!(claimed.map(|s| s.status), Some(SourceStatus::Processing));

        // Re-claim while PROCESSING is allowed (same worker retrying a stage).
        let reclaimed = Source::try_mark_processing(&id, &db).await.expect("claim");
        assert!(reclaimed.is_some());

        Source::mark_ready(&id, &db).await.expect("ready");
        let denied = Source::try_mark_processing(&id, &db).await.expect("claim");
        assert!(denied.is_none(), "READY source must not be re-processed");
    }

    #[tokio::test]
    async fn ready_never_regresses_to_failed() {
        let db = test_db().await;
        let source = Source::new(None, SourceType::Text, None);
        let id = source.id.clone();
        db.store_item(source).await.expect("store");

        Source::try_mark_processing(&id, &db).await.expect("claim");
        Source::mark_ready(&id, &db).await.expect("ready");
        Source::mark_failed(&id, "late failure", &db)
            .await
            .expect("failed");

        let row: Option<Source> = db.get_item(&id).await.expect("get");
        assert_eq!(row.unwrap().status, SourceStatus::Ready);
    }

    #[tokio::test]
    async fn mark_failed_records_error() {
        let db = test_db().await;
        let source = Source::new(None, SourceType::Pdf, Some("big.pdf".into()));
        let id = source.id.clone();
        db.store_item(source).await.expect("store");

        Source::try_mark_processing(&id, &db).await.expect("claim");
        Source::mark_failed(&id, "PDF exceeds max size", &db)
            .await
            .expect("failed");

        let row: Source = db.get_item(&id).await.expect("get").expect("exists");
        assert_eq!(row.status, SourceStatus::Failed);
        assert_eq!(row.error.as_deref(), Some("PDF exceeds max size"));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let db = test_db().await;
        let ready = Source::new(None, SourceType::Text, None);
        let ready_id = ready.id.clone();
        db.store_item(ready).await.expect("store");
        Source::try_mark_processing(&ready_id, &db)
            .await
            .expect("claim");
        Source::mark_ready(&ready_id, &db).await.expect("ready");

        db.store_item(Source::new(None, SourceType::Text, None))
            .await
            .expect("store");

        let listed = Source::list(&db, 10, 0, Some(SourceStatus::Ready), None)
            .await
            .expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, ready_id);

        let ready_ids = Source::ready_ids(&db).await.expect("ready ids");
        assert_eq!(ready_ids, vec![ready_id]);
    }
}
