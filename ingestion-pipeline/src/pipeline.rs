use std::sync::Arc;

use common::{
    error::AppError,
    provider::AiProvider,
    storage::{
        db::SurrealDbClient,
        files::SourceFileStore,
        types::{
            chunk::TextChunk,
            ingestion_task::{IngestionTask, IngestionTaskStatus},
            source::Source,
        },
    },
    utils::config::AppConfig,
};
use tracing::{info, warn};

use crate::{chunker::chunk_document, extract::extract_source};

const RETRY_BASE_DELAY_SECS: i64 = 5;
const RETRY_MAX_DELAY_SECS: i64 = 300;

/// Outcome of one ingestion attempt.
enum IngestOutcome {
    Completed,
    /// Nothing to do: the source vanished or another state owns it.
    Skipped,
}

pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    provider: AiProvider,
    files: SourceFileStore,
    config: AppConfig,
}

impl IngestionPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        provider: AiProvider,
        files: SourceFileStore,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            provider,
            files,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Claims and runs one queued task. Idempotent at the source level: the
    /// source status transition is the gate, chunk writes replace prior state.
    #[tracing::instrument(skip_all, fields(task_id = %task.id, source_id = %task.source_id))]
    pub async fn process_task(&self, task: IngestionTask) -> Result<(), AppError> {
        let Some(claimed) = task.try_claim(&self.db).await? else {
            // Another worker won the CAS.
            return Ok(());
        };

        match self.ingest_source(&claimed.source_id).await {
            Ok(IngestOutcome::Completed) => {
                claimed.mark_completed(&self.db).await?;
                info!(task_id = %claimed.id, "ingestion task succeeded");
                Ok(())
            }
            Ok(IngestOutcome::Skipped) => {
                claimed.mark_completed(&self.db).await?;
                info!(task_id = %claimed.id, "ingestion task had nothing to do");
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();
                let attempts = match &claimed.status {
                    IngestionTaskStatus::InProgress { attempts, .. } => *attempts,
                    _ => 1,
                };

                if err.is_retryable() && attempts < self.config.worker_max_attempts {
                    let delay = retry_delay(attempts);
                    claimed
                        .mark_failed_retryable(reason.clone(), delay, &self.db)
                        .await?;
                    warn!(
                        task_id = %claimed.id,
                        attempt = attempts,
                        retry_in_secs = delay,
                        error = %reason,
                        "ingestion task failed; scheduled retry"
                    );
                } else {
                    Source::mark_failed(&claimed.source_id, &reason, &self.db).await?;
                    claimed.mark_dead_letter(reason.clone(), &self.db).await?;
                    warn!(
                        task_id = %claimed.id,
                        attempt = attempts,
                        error = %reason,
                        "ingestion task failed terminally"
                    );
                }

                Err(AppError::Processing(reason))
            }
        }
    }

    async fn ingest_source(&self, source_id: &str) -> Result<IngestOutcome, AppError> {
        let existing: Option<Source> = self.db.get_item(source_id).await?;
        if existing.is_none() {
            info!(source_id, "source deleted before ingestion; exiting");
            return Ok(IngestOutcome::Skipped);
        }

        let Some(source) = Source::try_mark_processing(source_id, &self.db).await? else {
            info!(source_id, "source not claimable; another state owns it");
            return Ok(IngestOutcome::Skipped);
        };

        let document = extract_source(&source, &self.files, &self.config).await?;
        let payloads = chunk_document(
            &document.pages,
            self.config.chunk_char_target,
            self.config.chunk_char_overlap,
        );
        if payloads.is_empty() {
            return Err(AppError::Validation(
                "No extractable text found. If this is a scanned PDF, run OCR and re-upload."
                    .into(),
            ));
        }

        let texts: Vec<String> = payloads.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.provider.embed(&texts).await?;
        if embeddings.len() != payloads.len() {
            return Err(AppError::Provider(format!(
                "embedding count mismatch: {} chunks, {} vectors",
                payloads.len(),
                embeddings.len()
            )));
        }
        for embedding in &embeddings {
            if embedding.len() != self.config.embed_dim {
                return Err(AppError::Provider(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.config.embed_dim,
                    embedding.len()
                )));
            }
        }

        let rows: Vec<TextChunk> = payloads
            .into_iter()
            .zip(embeddings)
            .map(|(payload, embedding)| {
                TextChunk::new(
                    source.id.clone(),
                    payload.ordinal,
                    payload.page_start,
                    payload.page_end,
                    payload.section_path,
                    payload.text,
                    payload.char_start,
                    payload.char_end,
                    embedding,
                )
            })
            .collect();
        let chunk_count = rows.len();

        TextChunk::replace_for_source(&source.id, rows, &self.db).await?;
        Source::mark_ready(&source.id, &self.db).await?;

        info!(
            source_id = %source.id,
            chunks = chunk_count,
            "ingestion complete"
        );
        Ok(IngestOutcome::Completed)
    }
}

fn retry_delay(attempt: u32) -> i64 {
    let capped = attempt.saturating_sub(1).min(6);
    (RETRY_BASE_DELAY_SECS << capped).min(RETRY_MAX_DELAY_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use common::storage::indexes::ensure_runtime_indexes;
    use common::storage::types::ingestion_task::IngestionTaskStatus;
    use common::storage::types::source::{SourceStatus, SourceType};
    use common::utils::config::AiProviderKind;
    use uuid::Uuid;

    const DIM: usize = 16;

    async fn test_pipeline() -> (IngestionPipeline, Arc<SurrealDbClient>, SourceFileStore) {
        let db = Arc::new(
            SurrealDbClient::memory("pipeline_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );
        ensure_runtime_indexes(&db, DIM).await.expect("indexes");
        let config = AppConfig {
            ai_provider: AiProviderKind::Fake,
            embed_dim: DIM,
            chunk_char_target: 400,
            chunk_char_overlap: 80,
            ..Default::default()
        };
        let files = SourceFileStore::memory();
        let provider = AiProvider::from_config(&config);
        let pipeline = IngestionPipeline::new(db.clone(), provider, files.clone(), config);
        (pipeline, db, files)
    }

    async fn seed_text_source(
        db: &SurrealDbClient,
        files: &SourceFileStore,
        text: &str,
    ) -> (Source, IngestionTask) {
        let source = Source::new(Some("doc".into()), SourceType::Text, None);
        files
            .put(&source.id, "txt", Bytes::from(text.as_bytes().to_vec()))
            .await
            .expect("put payload");
        db.store_item(source.clone()).await.expect("store source");
        let task = IngestionTask::enqueue(source.id.clone(), db)
            .await
            .expect("enqueue");
        (source, task)
    }

    #[tokio::test]
    async fn text_source_reaches_ready_with_chunks() {
        let (pipeline, db, files) = test_pipeline().await;
        let body = "The mitochondria is the powerhouse of the cell. ".repeat(30);
        let (source, task) = seed_text_source(&db, &files, &body).await;

        pipeline.process_task(task).await.expect("process");

        let stored: Source = db.get_item(&source.id).await.expect("get").expect("row");
        assert_eq!(stored.status, SourceStatus::Ready);

        let chunks = TextChunk::by_source_ordered(&source.id, &db)
            .await
            .expect("chunks");
        assert!(chunks.len() > 1);
        for (idx, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, idx);
            assert_eq!(chunk.embedding.len(), DIM);
        }
    }

    #[tokio::test]
    async fn reingestion_replaces_chunks_instead_of_duplicating() {
        let (pipeline, db, files) = test_pipeline().await;
        let body = "Chunk worthy sentence content. ".repeat(40);
        let (source, task) = seed_text_source(&db, &files, &body).await;
        pipeline.process_task(task).await.expect("first run");

        let first_count = TextChunk::by_source_ordered(&source.id, &db)
            .await
            .expect("chunks")
            .len();

        // Simulate a redelivered task while the source is still PROCESSING:
        // the re-run must replace chunks, not append.
        db.client
            .query("UPDATE type::thing('source', $id) SET status = 'PROCESSING'")
            .bind(("id", source.id.clone()))
            .await
            .expect("force processing");
        let again = IngestionTask::enqueue(source.id.clone(), &db)
            .await
            .expect("enqueue");
        pipeline.process_task(again).await.expect("second run");

        let second_count = TextChunk::by_source_ordered(&source.id, &db)
            .await
            .expect("chunks")
            .len();
        assert_eq!(first_count, second_count);
    }

    #[tokio::test]
    async fn oversized_text_marks_source_failed() {
        let db = Arc::new(
            SurrealDbClient::memory("pipeline_ns", &Uuid::new_v4().to_string())
                .await
                .expect("in-memory surrealdb"),
        );
        ensure_runtime_indexes(&db, DIM).await.expect("indexes");
        let config = AppConfig {
            ai_provider: AiProviderKind::Fake,
            embed_dim: DIM,
            max_text_bytes: 16,
            ..Default::default()
        };
        let files = SourceFileStore::memory();
        let provider = AiProvider::from_config(&config);
        let pipeline = IngestionPipeline::new(db.clone(), provider, files.clone(), config);

        let (source, task) =
            seed_text_source(&db, &files, "this payload is longer than sixteen bytes").await;
        let result = pipeline.process_task(task).await;
        assert!(result.is_err());

        let stored: Source = db.get_item(&source.id).await.expect("get").expect("row");
        assert_eq!(stored.status, SourceStatus::Failed);
        assert!(stored.error.is_some());
    }

    #[tokio::test]
    async fn deleted_source_completes_task_quietly() {
        let (pipeline, db, files) = test_pipeline().await;
        let (source, task) = seed_text_source(&db, &files, "short doc").await;
        db.delete_item::<Source>(&source.id).await.expect("delete");

        pipeline.process_task(task.clone()).await.expect("process");

        let stored: IngestionTask = db.get_item(&task.id).await.expect("get").expect("row");
        assert_eq!(stored.status, IngestionTaskStatus::Completed);
    }

    #[tokio::test]
    async fn ready_source_is_not_reprocessed() {
        let (pipeline, db, files) = test_pipeline().await;
        let body = "Stable content that ingests fine. ".repeat(20);
        let (source, task) = seed_text_source(&db, &files, &body).await;
        pipeline.process_task(task).await.expect("first run");

        // Replace the stored payload; a rogue re-run must NOT pick it up
        // because READY is not a claimable source status.
        files
            .put(&source.id, "txt", Bytes::from_static(b"tampered"))
            .await
            .expect("tamper");
        let rogue = IngestionTask::enqueue(source.id.clone(), &db)
            .await
            .expect("enqueue");
        pipeline.process_task(rogue).await.expect("rogue run");

        let chunks = TextChunk::by_source_ordered(&source.id, &db)
            .await
            .expect("chunks");
        assert!(chunks.iter().all(|c| !c.text.contains("tampered")));
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        assert_eq!(retry_delay(1), 5);
        assert_eq!(retry_delay(2), 10);
        assert_eq!(retry_delay(3), 20);
        assert_eq!(retry_delay(20), RETRY_MAX_DELAY_SECS);
    }
}
