use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::job::{ImageUploadPayload, Job, JobOutcome, JobProgress, PathOutcome};
use crate::domain::media::TransformProfile;
use crate::domain::property::ImageRecord;
use crate::usecase::contracts::{JobQueue, MediaUploader, PropertyImageStore};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("malformed job payload: {0}")]
    MalformedPayload(String),
}

/// Absolute paths are kept; relative ones are resolved against `base_dir`.
pub fn resolve_path(base_dir: &Path, image_path: &str) -> PathBuf {
    let path = Path::new(image_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Consumes image-upload jobs: upload, record, then delete the local file, one path at a time.
pub struct UploadWorker<U, S, Q>
where
    U: MediaUploader,
    S: PropertyImageStore,
    Q: JobQueue,
{
    uploader: U,
    image_store: S,
    job_queue: Q,
    profile: TransformProfile,
    base_dir: PathBuf,
}

impl<U, S, Q> UploadWorker<U, S, Q>
where
    U: MediaUploader,
    S: PropertyImageStore,
    Q: JobQueue,
{
    pub fn new(uploader: U, image_store: S, job_queue: Q, profile: TransformProfile, base_dir: PathBuf) -> Self {
        Self {
            uploader,
            image_store,
            job_queue,
            profile,
            base_dir,
        }
    }

    /// Per-path failures are logged and counted, never returned. Only a bad payload fails the job.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn process_job(&self, job: &Job) -> Result<JobProgress, WorkerError> {
        let payload = ImageUploadPayload::from_job_data(&job.data).map_err(|e| {
            tracing::error!(error = %e, "malformed job payload");
            WorkerError::MalformedPayload(e.to_string())
        })?;

        let user_id = payload.user_id;
        let property_id = payload.property_id;
        let image_paths = payload.image_paths.into_vec();

        tracing::info!(
            %user_id,
            %property_id,
            path_count = image_paths.len(),
            "processing image upload job"
        );

        let mut progress = JobProgress::new(image_paths.len());
        for image_path in &image_paths {
            let outcome = self.process_path(image_path, user_id, property_id).await;
            progress.record(&outcome);

            if let Err(e) = self.job_queue.update_progress(job.id, &progress).await {
                tracing::warn!(error = %e, "failed to report job progress");
            }
        }

        let outcome = progress.finish();
        let label = match outcome {
            JobOutcome::Completed => "completed",
            JobOutcome::PartiallyFailed => "partially_failed",
        };
        metrics::counter!("image_jobs_total", "outcome" => label).increment(1);

        tracing::info!(
            %property_id,
            recorded = progress.recorded,
            skipped = progress.skipped,
            failed = progress.failed,
            total = progress.total,
            outcome = label,
            "image upload job finished"
        );

        Ok(progress)
    }

    #[tracing::instrument(skip(self), fields(image_path = %image_path))]
    async fn process_path(&self, image_path: &str, user_id: Uuid, property_id: Uuid) -> PathOutcome {
        match self.image_store.user_exists(user_id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(%user_id, "owner not found, leaving local file in place");
                metrics::counter!("image_uploads_total", "result" => "owner_missing").increment(1);
                return PathOutcome::OwnerMissing;
            }
            Err(e) => {
                tracing::error!(%user_id, error = %e, "owner lookup failed, leaving local file in place");
                metrics::counter!("image_uploads_total", "result" => "owner_missing").increment(1);
                return PathOutcome::OwnerMissing;
            }
        }

        let local_path = resolve_path(&self.base_dir, image_path);
        let idempotency_key = ImageRecord::idempotency_key(property_id, image_path);

        match self.image_store.image_recorded(&idempotency_key).await {
            Ok(true) => {
                tracing::info!("image already recorded by an earlier attempt, skipping upload");
                remove_local_file(&local_path).await;
                metrics::counter!("image_uploads_total", "result" => "already_recorded").increment(1);
                return PathOutcome::AlreadyRecorded;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "idempotency lookup failed, uploading anyway");
            }
        }

        let started = Instant::now();
        let image_url = match self.uploader.upload(&local_path, &self.profile).await {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(path = %local_path.display(), error = %e, "image upload failed");
                metrics::counter!("image_uploads_total", "result" => "upload_failed").increment(1);
                return PathOutcome::UploadFailed;
            }
        };
        metrics::histogram!("image_upload_duration_seconds").record(started.elapsed().as_secs_f64());

        let record = ImageRecord::new(property_id, image_url.clone(), idempotency_key);
        if let Err(e) = self.image_store.record_image(&record).await {
            // The asset now exists remotely without a row pointing at it.
            tracing::error!(%image_url, error = %e, "failed to record image, remote asset orphaned");
            metrics::counter!("image_uploads_total", "result" => "record_failed").increment(1);
            return PathOutcome::RecordFailed;
        }

        tracing::info!(%image_url, "image recorded");
        remove_local_file(&local_path).await;
        metrics::counter!("image_uploads_total", "result" => "recorded").increment(1);

        PathOutcome::Recorded { image_url }
    }
}

async fn remove_local_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "deleted local file"),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "local file already gone");
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to delete local file");
        }
    }
}
