use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::repository::nats::{ClaimedJob, JobConsumer};
use crate::usecase::contracts::{JobQueue, MediaUploader, PropertyImageStore};
use crate::usecase::upload_worker::UploadWorker;

const IDLE_DELAY: Duration = Duration::from_millis(100);
const ERROR_DELAY: Duration = Duration::from_secs(5);

/// Runs `concurrency` claim loops until `shutdown` fires. In-flight jobs finish before this returns.
pub async fn run_worker<U, S, Q>(
    consumer: &JobConsumer,
    worker: &UploadWorker<U, S, Q>,
    concurrency: usize,
    shutdown: CancellationToken,
) where
    U: MediaUploader,
    S: PropertyImageStore,
    Q: JobQueue,
{
    let slots = concurrency.max(1);
    tracing::info!(job_type = consumer.job_type(), slots, "worker started");

    join_all((0..slots).map(|slot| run_slot(slot, consumer, worker, &shutdown))).await;

    tracing::info!(job_type = consumer.job_type(), "worker drained");
}

async fn run_slot<U, S, Q>(
    slot: usize,
    consumer: &JobConsumer,
    worker: &UploadWorker<U, S, Q>,
    shutdown: &CancellationToken,
) where
    U: MediaUploader,
    S: PropertyImageStore,
    Q: JobQueue,
{
    loop {
        let claimed = tokio::select! {
            _ = shutdown.cancelled() => break,
            claimed = consumer.dequeue() => claimed,
        };

        let delay = match claimed {
            Ok(Some(claim)) => {
                handle(consumer, worker, claim).await;
                continue;
            }
            Ok(None) => IDLE_DELAY,
            Err(e) => {
                tracing::error!(slot, error = %e, "failed to fetch job");
                ERROR_DELAY
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!(slot, "worker slot stopped");
}

async fn handle<U, S, Q>(consumer: &JobConsumer, worker: &UploadWorker<U, S, Q>, claim: ClaimedJob)
where
    U: MediaUploader,
    S: PropertyImageStore,
    Q: JobQueue,
{
    let job_id = claim.job.id;
    let started = Instant::now();

    let result = {
        let processing = worker.process_job(&claim.job);
        tokio::pin!(processing);

        let mut heartbeat = tokio::time::interval(consumer.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                result = &mut processing => break result,
                _ = heartbeat.tick() => {
                    if let Err(e) = consumer.heartbeat(&claim).await {
                        tracing::warn!(%job_id, error = %e, "failed to extend job claim");
                    }
                }
            }
        }
    };

    match result {
        Ok(progress) => {
            if let Err(e) = consumer.complete(claim, progress).await {
                tracing::error!(%job_id, error = %e, "failed to mark job completed");
            }
        }
        Err(e) => {
            tracing::error!(%job_id, error = %e, "job failed");
            match consumer.fail(claim, &e.to_string()).await {
                Ok(status) => tracing::info!(%job_id, %status, "job failure recorded"),
                Err(e) => tracing::error!(%job_id, error = %e, "failed to record job failure"),
            }
        }
    }

    metrics::histogram!("image_job_duration_seconds").record(started.elapsed().as_secs_f64());
}
