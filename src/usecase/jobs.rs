use uuid::Uuid;

use crate::domain::job::Job;
use crate::usecase::contracts::JobQueue;
use crate::usecase::error::UsecaseError;

/// Read-only view over the job queue.
pub struct JobsUseCase<Q>
where
    Q: JobQueue,
{
    job_queue: Q,
    job_type: String,
}

impl<Q> JobsUseCase<Q>
where
    Q: JobQueue,
{
    pub fn new(job_queue: Q, job_type: impl Into<String>) -> Self {
        Self {
            job_queue,
            job_type: job_type.into(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn active_jobs(&self) -> Result<Vec<Uuid>, UsecaseError> {
        let ids = self.job_queue.list_active(&self.job_type).await?;
        tracing::debug!(count = ids.len(), "listed active jobs");
        Ok(ids)
    }

    /// Unknown and unparseable ids both come back as not found.
    #[tracing::instrument(skip(self))]
    pub async fn get_job(&self, job_id: &str) -> Result<Job, UsecaseError> {
        let not_found = || UsecaseError::NotFound(format!("Job with ID {}", job_id));

        let id = Uuid::parse_str(job_id).map_err(|_| not_found())?;
        self.job_queue.get_job(id).await?.ok_or_else(not_found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::IMAGE_UPLOAD_JOB;
    use crate::repository::errors::QueueError;
    use crate::usecase::contracts::MockJobQueue;

    #[tokio::test]
    async fn test_active_jobs() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let returned = ids.clone();

        let mut queue = MockJobQueue::new();
        queue.expect_list_active().times(1).returning(move |job_type| {
            assert_eq!(job_type, IMAGE_UPLOAD_JOB);
            Ok(returned.clone())
        });

        let usecase = JobsUseCase::new(queue, IMAGE_UPLOAD_JOB);
        assert_eq!(usecase.active_jobs().await.unwrap(), ids);
    }

    #[tokio::test]
    async fn test_get_job_found() {
        let job = Job::new(IMAGE_UPLOAD_JOB, serde_json::json!({ "imagePaths": ["a.jpg"] }));
        let job_id = job.id;
        let stored = job.clone();

        let mut queue = MockJobQueue::new();
        queue
            .expect_get_job()
            .with(mockall::predicate::eq(job_id))
            .times(1)
            .returning(move |_| Ok(Some(stored.clone())));

        let usecase = JobsUseCase::new(queue, IMAGE_UPLOAD_JOB);
        let found = usecase.get_job(&job_id.to_string()).await.unwrap();

        assert_eq!(found, job);
    }

    #[tokio::test]
    async fn test_get_job_not_found() {
        let mut queue = MockJobQueue::new();
        queue.expect_get_job().times(1).returning(|_| Ok(None));

        let usecase = JobsUseCase::new(queue, IMAGE_UPLOAD_JOB);
        let result = usecase.get_job(&Uuid::new_v4().to_string()).await;

        assert!(matches!(result, Err(UsecaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_job_invalid_id_is_not_found() {
        let mut queue = MockJobQueue::new();
        queue.expect_get_job().times(0);

        let usecase = JobsUseCase::new(queue, IMAGE_UPLOAD_JOB);
        let result = usecase.get_job("42").await;

        assert!(matches!(result, Err(UsecaseError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_queue_outage_is_unavailable() {
        let mut queue = MockJobQueue::new();
        queue
            .expect_list_active()
            .returning(|_| Err(QueueError::Unavailable("timed out".to_string())));

        let usecase = JobsUseCase::new(queue, IMAGE_UPLOAD_JOB);
        assert!(matches!(
            usecase.active_jobs().await,
            Err(UsecaseError::Unavailable(_))
        ));
    }
}
