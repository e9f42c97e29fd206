use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{pull, PullConsumer},
    kv,
    message::{AckKind, Message},
    stream,
};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::job::{FailureAction, Job, JobProgress, JobStatus, RetryPolicy},
    repository::errors::QueueError,
    usecase::contracts::JobQueue,
};

const SUBJECT_PREFIX: &str = "jobs";
const DEAD_LETTER_PREFIX: &str = "jobs.dead-letter";

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub stream_name: String,
    pub bucket: String,
    pub retention: Duration,
    pub ack_wait: Duration,
    pub retry: RetryPolicy,
}

/// Wire format of a job message. The authoritative job record lives in the KV bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct QueuedMessage {
    id: Uuid,
    name: String,
    data: serde_json::Value,
}

fn job_subject(job_type: &str) -> String {
    format!("{}.{}", SUBJECT_PREFIX, job_type)
}

fn dead_letter_subject(job_type: &str) -> String {
    format!("{}.{}", DEAD_LETTER_PREFIX, job_type)
}

/// Key of a job in the active-job index bucket.
fn active_key(job_type: &str, job_id: Uuid) -> String {
    format!("{}.{}", job_type, job_id)
}

fn active_ids<I>(job_type: &str, keys: I) -> Vec<Uuid>
where
    I: IntoIterator<Item = String>,
{
    let prefix = format!("{}.", job_type);
    keys.into_iter()
        .filter_map(|key| {
            key.strip_prefix(&prefix)
                .and_then(|id| Uuid::parse_str(id).ok())
        })
        .collect()
}

/// Progress acks keep a long-running claim alive well inside `ack_wait`.
fn heartbeat_interval(ack_wait: Duration) -> Duration {
    (ack_wait / 3).max(Duration::from_secs(1))
}

fn unavailable<E: std::fmt::Display>(e: E) -> QueueError {
    QueueError::Unavailable(e.to_string())
}

/// Job queue backed by a JetStream work-queue stream plus a KV bucket of job records.
#[derive(Clone)]
pub struct JetStreamJobQueue {
    context: jetstream::Context,
    jobs: kv::Store,
    active: kv::Store,
    settings: QueueSettings,
}

impl JetStreamJobQueue {
    pub async fn connect(client: async_nats::Client, settings: QueueSettings) -> Result<Self, QueueError> {
        let context = jetstream::new(client);

        context
            .get_or_create_stream(stream::Config {
                name: settings.stream_name.clone(),
                subjects: vec![format!("{}.>", SUBJECT_PREFIX)],
                retention: stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(unavailable)?;
        tracing::info!(stream = %settings.stream_name, "job stream ready");

        let jobs = open_bucket(&context, &settings.bucket, settings.retention).await?;
        let active_bucket = format!("{}-active", settings.bucket);
        let active = open_bucket(&context, &active_bucket, settings.retention).await?;
        tracing::info!(bucket = %settings.bucket, active_bucket = %active_bucket, "job record buckets ready");

        Ok(Self {
            context,
            jobs,
            active,
            settings,
        })
    }

    /// Durable pull consumer for one job type; the broker gives each message to one claimant.
    pub async fn consumer(&self, job_type: &str) -> Result<JobConsumer, QueueError> {
        let durable = format!("{}-worker", job_type);
        let stream = self
            .context
            .get_stream(self.settings.stream_name.as_str())
            .await
            .map_err(unavailable)?;

        let consumer = stream
            .get_or_create_consumer(
                &durable,
                pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: job_subject(job_type),
                    ack_wait: self.settings.ack_wait,
                    max_deliver: self.settings.retry.broker_max_deliver(),
                    ..Default::default()
                },
            )
            .await
            .map_err(unavailable)?;
        tracing::info!(consumer = %durable, "job consumer ready");

        Ok(JobConsumer {
            queue: self.clone(),
            consumer,
            job_type: job_type.to_string(),
        })
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, QueueError> {
        let entry = self
            .jobs
            .get(job_id.to_string())
            .await
            .map_err(unavailable)?;

        match entry {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, job: &Job) -> Result<(), QueueError> {
        let bytes = serde_json::to_vec(job)?;
        self.jobs
            .put(job.id.to_string(), bytes.into())
            .await
            .map_err(unavailable)?;
        self.index_active(job).await
    }

    async fn index_active(&self, job: &Job) -> Result<(), QueueError> {
        let key = active_key(&job.name, job.id);
        match job.status {
            JobStatus::Active => {
                self.active.put(key, Bytes::new()).await.map_err(unavailable)?;
            }
            JobStatus::Waiting => {}
            JobStatus::Delayed | JobStatus::Completed | JobStatus::Failed => {
                self.active.delete(key).await.map_err(unavailable)?;
            }
        }
        Ok(())
    }

    async fn publish(&self, job: &Job) -> Result<(), QueueError> {
        let message = serde_json::to_vec(&QueuedMessage {
            id: job.id,
            name: job.name.clone(),
            data: job.data.clone(),
        })?;

        // The broker drops a second publish carrying the same message id.
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", job.id.to_string().as_str());

        self.context
            .publish_with_headers(job_subject(&job.name), headers, message.into())
            .await
            .map_err(unavailable)?
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

async fn open_bucket(context: &jetstream::Context, bucket: &str, max_age: Duration) -> Result<kv::Store, QueueError> {
    match context.get_key_value(bucket).await {
        Ok(store) => Ok(store),
        Err(_) => context
            .create_key_value(kv::Config {
                bucket: bucket.to_string(),
                history: 1,
                max_age,
                ..Default::default()
            })
            .await
            .map_err(unavailable),
    }
}

impl JobQueue for JetStreamJobQueue {
    #[tracing::instrument(skip(self, payload))]
    async fn enqueue(&self, job_type: &str, payload: serde_json::Value) -> Result<Uuid, QueueError> {
        let job = Job::new(job_type, payload);
        self.save(&job).await?;

        if let Err(e) = self.publish(&job).await {
            // No message means no worker will ever pick the record up.
            if let Err(rollback) = self.jobs.delete(job.id.to_string()).await {
                tracing::warn!(job_id = %job.id, error = %rollback, "failed to remove unpublished job record");
            }
            return Err(e);
        }

        metrics::counter!("jobs_enqueued_total", "job_type" => job_type.to_string()).increment(1);
        tracing::info!(job_id = %job.id, "job enqueued");
        Ok(job.id)
    }

    #[tracing::instrument(skip(self), fields(job_id = %job_id))]
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, QueueError> {
        self.load(job_id).await
    }

    #[tracing::instrument(skip(self))]
    async fn list_active(&self, job_type: &str) -> Result<Vec<Uuid>, QueueError> {
        let keys: Vec<String> = self
            .active
            .keys()
            .await
            .map_err(unavailable)?
            .try_collect()
            .await
            .map_err(unavailable)?;

        let active = active_ids(job_type, keys);

        tracing::debug!(count = active.len(), "listed active jobs");
        Ok(active)
    }

    #[tracing::instrument(skip(self, progress), fields(job_id = %job_id))]
    async fn update_progress(&self, job_id: Uuid, progress: &JobProgress) -> Result<(), QueueError> {
        let Some(mut job) = self.load(job_id).await? else {
            tracing::warn!("progress update for unknown job");
            return Ok(());
        };
        job.progress = progress.clone();
        self.save(&job).await
    }
}

/// A job held exclusively by this worker until it is completed or failed.
pub struct ClaimedJob {
    pub job: Job,
    message: Message,
}

pub struct JobConsumer {
    queue: JetStreamJobQueue,
    consumer: PullConsumer,
    job_type: String,
}

impl JobConsumer {
    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// Claims the next job, or `None` when nothing is waiting.
    pub async fn dequeue(&self) -> Result<Option<ClaimedJob>, QueueError> {
        let mut messages = self
            .consumer
            .fetch()
            .max_messages(1)
            .messages()
            .await
            .map_err(unavailable)?;

        let Some(message) = messages.next().await else {
            return Ok(None);
        };
        let message = message.map_err(unavailable)?;

        let queued: QueuedMessage = match serde_json::from_slice(&message.payload) {
            Ok(queued) => queued,
            Err(e) => {
                tracing::error!(error = %e, "undecodable job message, terminating it");
                message.ack_with(AckKind::Term).await.map_err(unavailable)?;
                return Ok(None);
            }
        };

        let attempt = message
            .info()
            .map(|info| u32::try_from(info.delivered).unwrap_or(u32::MAX))
            .unwrap_or(1);

        let mut job = match self.queue.load(queued.id).await? {
            Some(job) => job,
            None => {
                tracing::warn!(job_id = %queued.id, "job record missing, rebuilding from message");
                let mut job = Job::new(queued.name, queued.data);
                job.id = queued.id;
                job
            }
        };

        if job.is_finished() {
            tracing::info!(job_id = %job.id, status = %job.status, "job already finished, acking redelivery");
            message.ack().await.map_err(unavailable)?;
            return Ok(None);
        }

        if self.queue.settings.retry.is_exhausted(attempt) {
            let reason = job
                .failed_reason
                .clone()
                .unwrap_or_else(|| "attempt abandoned without a result".to_string());
            tracing::error!(job_id = %job.id, attempt, "delivery past the attempt budget, failing job");
            self.dead_letter(&mut job, &message, reason).await?;
            return Ok(None);
        }

        job.mark_active(attempt);
        self.queue.save(&job).await?;
        tracing::info!(job_id = %job.id, attempt, "job claimed");

        Ok(Some(ClaimedJob { job, message }))
    }

    pub async fn complete(&self, claim: ClaimedJob, progress: JobProgress) -> Result<(), QueueError> {
        let mut job = self.current(&claim).await?;
        job.mark_completed(progress);
        self.queue.save(&job).await?;
        claim.message.ack().await.map_err(unavailable)?;

        tracing::info!(job_id = %job.id, "job completed");
        Ok(())
    }

    /// Schedules a retry with backoff, or fails the job and dead-letters it once attempts run out.
    pub async fn fail(&self, claim: ClaimedJob, reason: &str) -> Result<JobStatus, QueueError> {
        let mut job = self.current(&claim).await?;
        let attempt = claim.job.attempts_made;

        match self.queue.settings.retry.after_failure(attempt) {
            FailureAction::Retry(delay) => {
                job.mark_delayed(reason.to_string());
                self.queue.save(&job).await?;
                claim
                    .message
                    .ack_with(AckKind::Nak(Some(delay)))
                    .await
                    .map_err(unavailable)?;

                tracing::warn!(job_id = %job.id, attempt, delay_ms = delay.as_millis() as u64, "job scheduled for retry");
            }
            FailureAction::DeadLetter => {
                self.dead_letter(&mut job, &claim.message, reason.to_string()).await?;

                tracing::error!(job_id = %job.id, attempt, "job failed permanently, moved to dead letter");
            }
        }

        Ok(job.status)
    }

    async fn current(&self, claim: &ClaimedJob) -> Result<Job, QueueError> {
        Ok(self
            .queue
            .load(claim.job.id)
            .await?
            .unwrap_or_else(|| claim.job.clone()))
    }

    /// Marks the job failed, republishes it on the dead-letter subject and terminates the message.
    async fn dead_letter(&self, job: &mut Job, message: &Message, reason: String) -> Result<(), QueueError> {
        job.mark_failed(reason);
        self.queue.save(job).await?;

        let payload = serde_json::to_vec(job)?;
        self.queue
            .context
            .publish(dead_letter_subject(&self.job_type), payload.into())
            .await
            .map_err(unavailable)?
            .await
            .map_err(unavailable)?;
        message.ack_with(AckKind::Term).await.map_err(unavailable)?;
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        heartbeat_interval(self.queue.settings.ack_wait)
    }

    /// Resets the broker's redelivery timer for a job still being processed.
    pub async fn heartbeat(&self, claim: &ClaimedJob) -> Result<(), QueueError> {
        claim
            .message
            .ack_with(AckKind::Progress)
            .await
            .map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::IMAGE_UPLOAD_JOB;

    #[test]
    fn test_subjects() {
        assert_eq!(job_subject(IMAGE_UPLOAD_JOB), "jobs.image-upload");
        assert_eq!(dead_letter_subject(IMAGE_UPLOAD_JOB), "jobs.dead-letter.image-upload");
    }

    #[test]
    fn test_dead_letter_subject_outside_worker_filter() {
        assert_ne!(
            dead_letter_subject(IMAGE_UPLOAD_JOB),
            job_subject(IMAGE_UPLOAD_JOB)
        );
        assert!(dead_letter_subject(IMAGE_UPLOAD_JOB).starts_with("jobs."));
    }

    #[test]
    fn test_queued_message_wire_format() {
        let id = Uuid::new_v4();
        let raw = serde_json::json!({
            "id": id,
            "name": IMAGE_UPLOAD_JOB,
            "data": { "imagePaths": ["a.jpg"] },
        });

        let message: QueuedMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(message.id, id);
        assert_eq!(message.name, IMAGE_UPLOAD_JOB);
    }

    #[test]
    fn test_active_index_filters_by_job_type() {
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();
        let keys = vec![
            active_key(IMAGE_UPLOAD_JOB, mine),
            active_key("thumbnail", other),
            format!("{}.not-a-uuid", IMAGE_UPLOAD_JOB),
        ];

        assert_eq!(active_ids(IMAGE_UPLOAD_JOB, keys), vec![mine]);
    }

    #[test]
    fn test_heartbeat_fires_well_inside_ack_wait() {
        assert_eq!(heartbeat_interval(Duration::from_secs(120)), Duration::from_secs(40));
        assert_eq!(heartbeat_interval(Duration::from_millis(500)), Duration::from_secs(1));
    }
}
