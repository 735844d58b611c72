pub mod chunker;
pub mod extract;
pub mod pipeline;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use common::storage::{db::SurrealDbClient, types::ingestion_task::IngestionTask};
use futures::StreamExt;
use pipeline::IngestionPipeline;
use surrealdb::Action;
use tokio::sync::Semaphore;
use tracing::{error, info};

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Worker loop: a startup sweep catches jobs queued while the worker was
/// down (and is the visibility-timeout recovery path), a live query delivers
/// new ones, and a periodic sweep re-surfaces retry-eligible failures.
pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    ingestion_pipeline: Arc<IngestionPipeline>,
) -> Result<(), Box<dyn std::error::Error>> {
    let concurrency = ingestion_pipeline.config().worker_concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));

    loop {
        sweep_unfinished(&db, &ingestion_pipeline, &semaphore).await?;

        info!("Listening for new ingestion jobs...");
        let mut job_stream = IngestionTask::listen(&db).await?;
        let mut sweep_tick = tokio::time::interval(SWEEP_INTERVAL);
        sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the startup sweep already ran.
        sweep_tick.tick().await;

        loop {
            tokio::select! {
                notification = job_stream.next() => {
                    match notification {
                        Some(Ok(notification)) => {
                            if matches!(notification.action, Action::Create | Action::Update) {
                                dispatch(notification.data, &ingestion_pipeline, &semaphore).await;
                            }
                        }
                        Some(Err(err)) => error!("Error in job notification: {err}"),
                        None => break,
                    }
                }
                _ = sweep_tick.tick() => {
                    if let Err(err) = sweep_unfinished(&db, &ingestion_pipeline, &semaphore).await {
                        error!("Sweep for unfinished jobs failed: {err}");
                    }
                }
            }
        }

        error!("Database stream ended unexpectedly, reconnecting...");
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn sweep_unfinished(
    db: &Arc<SurrealDbClient>,
    pipeline: &Arc<IngestionPipeline>,
    semaphore: &Arc<Semaphore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let unfinished = IngestionTask::get_unfinished_tasks(db).await?;
    if !unfinished.is_empty() {
        info!("Found {} candidate jobs", unfinished.len());
    }
    for task in unfinished {
        dispatch(task, pipeline, semaphore).await;
    }
    Ok(())
}

/// Spawns a bounded processing task when the job is actually claimable.
/// `try_claim` inside the pipeline settles races between workers.
async fn dispatch(
    task: IngestionTask,
    pipeline: &Arc<IngestionPipeline>,
    semaphore: &Arc<Semaphore>,
) {
    let config = pipeline.config();
    let claimable = task.is_claimable(
        Utc::now().timestamp(),
        config.worker_max_attempts,
        config.worker_visibility_timeout_secs as i64,
    );
    if !claimable {
        return;
    }

    let Ok(permit) = semaphore.clone().acquire_owned().await else {
        return;
    };
    let pipeline = pipeline.clone();
    tokio::spawn(async move {
        let _permit = permit;
        if let Err(err) = pipeline.process_task(task).await {
            error!("Error processing ingestion task: {err}");
        }
    });
}
