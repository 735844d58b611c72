use futures::Stream;
use surrealdb::Notification;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

/// Queue row states. Epoch seconds rather than datetimes so eligibility
/// comparisons stay plain integer math on both sides of the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum IngestionTaskStatus {
    Created,
    InProgress {
        attempts: u32,
        started_epoch: i64,
    },
    /// Failed but retryable once `retry_at_epoch` passes.
    Failed {
        attempts: u32,
        error: String,
        retry_at_epoch: i64,
    },
    Completed,
    DeadLetter {
        error: String,
    },
}

stored_object!(IngestionTask, "job", {
    source_id: String,
    status: IngestionTaskStatus
});

impl IngestionTask {
    pub fn new(source_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source_id,
            status: IngestionTaskStatus::Created,
        }
    }

    /// Creates the job row, which wakes any worker listening on the table.
    pub async fn enqueue(source_id: String, db: &SurrealDbClient) -> Result<Self, AppError> {
        let task = Self::new(source_id);
        db.store_item(task.clone()).await?;
        Ok(task)
    }

    pub async fn listen(
        db: &SurrealDbClient,
    ) -> Result<impl Stream<Item = Result<Notification<Self>, surrealdb::Error>>, surrealdb::Error>
    {
        db.listen::<Self>().await
    }

    fn attempts_so_far(&self) -> u32 {
        match &self.status {
            IngestionTaskStatus::InProgress { attempts, .. }
            | IngestionTaskStatus::Failed { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Whether this row may be claimed right now. `Created` rows always
    /// qualify; `Failed` rows once their backoff elapsed; `InProgress` rows
    /// once the visibility timeout expires (their worker is presumed dead).
    pub fn is_claimable(&self, now_epoch: i64, max_attempts: u32, visibility_secs: i64) -> bool {
        match &self.status {
            IngestionTaskStatus::Created => true,
            IngestionTaskStatus::Failed {
                attempts,
                retry_at_epoch,
                ..
            } => *attempts < max_attempts && *retry_at_epoch <= now_epoch,
            IngestionTaskStatus::InProgress {
                attempts,
                started_epoch,
            } => *attempts < max_attempts && started_epoch + visibility_secs <= now_epoch,
            IngestionTaskStatus::Completed | IngestionTaskStatus::DeadLetter { .. } => false,
        }
    }

    /// Compare-and-swap claim: transitions to InProgress only when the status
    /// is still the one this worker observed. Returns `None` when another
    /// worker won the race.
    pub async fn try_claim(&self, db: &SurrealDbClient) -> Result<Option<Self>, AppError> {
        let claimed_status = IngestionTaskStatus::InProgress {
            attempts: self.attempts_so_far() + 1,
            started_epoch: Utc::now().timestamp(),
        };
        let mut response = db
            .client
            .query(
                "UPDATE type::thing('job', $id)
                 SET status = $claimed, updated_at = time::now()
                 WHERE status = $expected
                 RETURN AFTER",
            )
            .bind(("id", self.id.clone()))
            .bind(("claimed", claimed_status))
            .bind(("expected", self.status.clone()))
            .await?;
        let rows: Vec<Self> = response.take(0)?;
        Ok(rows.into_iter().next())
    }

    pub async fn mark_completed(&self, db: &SurrealDbClient) -> Result<(), AppError> {
        Self::set_status(&self.id, IngestionTaskStatus::Completed, db).await
    }

    /// Schedules a retry after `delay_secs`.
    pub async fn mark_failed_retryable(
        &self,
        error: String,
        delay_secs: i64,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let status = IngestionTaskStatus::Failed {
            attempts: self.attempts_so_far(),
            error,
            retry_at_epoch: Utc::now().timestamp() + delay_secs,
        };
        Self::set_status(&self.id, status, db).await
    }

    pub async fn mark_dead_letter(
        &self,
        error: String,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        Self::set_status(&self.id, IngestionTaskStatus::DeadLetter { error }, db).await
    }

    async fn set_status(
        id: &str,
        status: IngestionTaskStatus,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query(
                "UPDATE type::thing('job', $id)
                 SET status = $status, updated_at = time::now()",
            )
            .bind(("id", id.to_string()))
            .bind(("status", status))
            .await?
            .check()?;
        Ok(())
    }

    /// Rows that may need work: fresh, retry-eligible, or stale in-progress.
    /// Final claimability is re-checked in Rust and enforced by `try_claim`.
    pub async fn get_unfinished_tasks(db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query(
                "SELECT * FROM job
                 WHERE status = 'Created'
                    OR status.Failed != NONE
                    OR status.InProgress != NONE
                 ORDER BY created_at ASC",
            )
            .await?;
        Ok(response.take(0)?)
    }
}
