use std::path::Path;

use uuid::Uuid;

use crate::{
    domain::job::{Job, JobProgress},
    domain::media::TransformProfile,
    domain::property::{ImageRecord, PageRequest, Property, PropertyWithImages},
    repository::errors::{QueueError, RepositoryError, UploadError},
};

#[cfg_attr(test, mockall::automock)]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_type: &str, payload: serde_json::Value) -> Result<Uuid, QueueError>;
    async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, QueueError>;
    async fn list_active(&self, job_type: &str) -> Result<Vec<Uuid>, QueueError>;
    async fn update_progress(&self, job_id: Uuid, progress: &JobProgress) -> Result<(), QueueError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, local_path: &Path, profile: &TransformProfile) -> Result<String, UploadError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait PropertyImageStore: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, RepositoryError>;
    async fn image_recorded(&self, idempotency_key: &str) -> Result<bool, RepositoryError>;
    async fn record_image(&self, record: &ImageRecord) -> Result<(), RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait PropertyRepository: Send + Sync {
    async fn create(&self, property: &Property) -> Result<Property, RepositoryError>;
    async fn list(&self, page: &PageRequest) -> Result<(Vec<PropertyWithImages>, i64), RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait ApiKeyRepository: Send + Sync {
    async fn find_owner(&self, key: &str) -> Result<Option<Uuid>, RepositoryError>;
}
