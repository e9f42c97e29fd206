use uuid::Uuid;

use crate::domain::job::{ImageUploadPayload, IMAGE_UPLOAD_JOB};
use crate::domain::property::{PageRequest, Property, PropertyWithImages};
use crate::usecase::contracts::{JobQueue, PropertyRepository};
use crate::usecase::error::UsecaseError;

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedProperty {
    pub property: Property,
    pub job_id: Option<Uuid>,
}

/// Producer side of the image pipeline: persists the property, then enqueues its images.
pub struct PropertiesUseCase<R, Q>
where
    R: PropertyRepository,
    Q: JobQueue,
{
    property_repository: R,
    job_queue: Q,
}

impl<R, Q> PropertiesUseCase<R, Q>
where
    R: PropertyRepository,
    Q: JobQueue,
{
    pub fn new(property_repository: R, job_queue: Q) -> Self {
        Self {
            property_repository,
            job_queue,
        }
    }

    #[tracing::instrument(skip(self, property, image_paths), fields(property_id = %property.id, image_count = image_paths.len()))]
    pub async fn create_property(
        &self,
        property: Property,
        image_paths: Vec<String>,
    ) -> Result<CreatedProperty, UsecaseError> {
        tracing::debug!("creating property");

        let property = self.property_repository.create(&property).await?;

        if image_paths.is_empty() {
            tracing::debug!(property_id = %property.id, "no images attached, nothing to enqueue");
            return Ok(CreatedProperty {
                property,
                job_id: None,
            });
        }

        let payload = ImageUploadPayload::new(image_paths, property.user_id, property.id);
        let payload = serde_json::to_value(&payload).map_err(|e| UsecaseError::Internal(e.to_string()))?;

        let job_id = self
            .job_queue
            .enqueue(IMAGE_UPLOAD_JOB, payload)
            .await
            .inspect_err(|e| {
                tracing::error!(property_id = %property.id, error = %e, "property saved but image job could not be enqueued");
            })?;

        tracing::info!(property_id = %property.id, %job_id, "property created, image job enqueued");
        Ok(CreatedProperty {
            property,
            job_id: Some(job_id),
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_properties(
        &self,
        page: PageRequest,
    ) -> Result<(Vec<PropertyWithImages>, i64), UsecaseError> {
        let (properties, total) = self.property_repository.list(&page).await?;

        tracing::debug!(count = properties.len(), total, "listed properties");
        Ok((properties, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::errors::{QueueError, RepositoryError};
    use crate::usecase::contracts::{MockJobQueue, MockPropertyRepository};

    fn property() -> Property {
        Property::new(
            Uuid::new_v4(),
            "Sea view flat".to_string(),
            None,
            Some("Lisbon".to_string()),
            2100.0,
            None,
        )
    }

    #[tokio::test]
    async fn test_create_property_enqueues_images() {
        let mut repo = MockPropertyRepository::new();
        repo.expect_create().times(1).returning(|p| Ok(p.clone()));

        let job_id = Uuid::new_v4();
        let mut queue = MockJobQueue::new();
        queue.expect_enqueue().times(1).returning(move |job_type, payload| {
            assert_eq!(job_type, IMAGE_UPLOAD_JOB);
            let payload = ImageUploadPayload::from_job_data(&payload).unwrap();
            assert_eq!(
                payload.image_paths.into_vec(),
                vec!["uploads/a.jpg".to_string(), "uploads/b.jpg".to_string()]
            );
            Ok(job_id)
        });

        let usecase = PropertiesUseCase::new(repo, queue);
        let property = property();
        let created = usecase
            .create_property(
                property.clone(),
                vec!["uploads/a.jpg".to_string(), "uploads/b.jpg".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(created.property, property);
        assert_eq!(created.job_id, Some(job_id));
    }

    #[tokio::test]
    async fn test_create_property_without_images_skips_queue() {
        let mut repo = MockPropertyRepository::new();
        repo.expect_create().times(1).returning(|p| Ok(p.clone()));
        let mut queue = MockJobQueue::new();
        queue.expect_enqueue().times(0);

        let usecase = PropertiesUseCase::new(repo, queue);
        let created = usecase.create_property(property(), vec![]).await.unwrap();

        assert!(created.job_id.is_none());
    }

    #[tokio::test]
    async fn test_create_property_queue_unavailable() {
        let mut repo = MockPropertyRepository::new();
        repo.expect_create().times(1).returning(|p| Ok(p.clone()));
        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .returning(|_, _| Err(QueueError::Unavailable("no responders".to_string())));

        let usecase = PropertiesUseCase::new(repo, queue);
        let result = usecase
            .create_property(property(), vec!["uploads/a.jpg".to_string()])
            .await;

        assert!(matches!(result, Err(UsecaseError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_create_property_database_error_does_not_enqueue() {
        let mut repo = MockPropertyRepository::new();
        repo.expect_create()
            .returning(|_| Err(RepositoryError::DatabaseError("duplicate key".to_string())));
        let mut queue = MockJobQueue::new();
        queue.expect_enqueue().times(0);

        let usecase = PropertiesUseCase::new(repo, queue);
        let result = usecase
            .create_property(property(), vec!["uploads/a.jpg".to_string()])
            .await;

        assert!(matches!(result, Err(UsecaseError::Internal(_))));
    }

    #[tokio::test]
    async fn test_list_properties() {
        let mut repo = MockPropertyRepository::new();
        repo.expect_list().times(1).returning(|page| {
            assert_eq!(page.limit, 10);
            Ok((
                vec![PropertyWithImages {
                    property: property(),
                    images: vec!["https://cdn.example.com/a.jpg".to_string()],
                }],
                1,
            ))
        });

        let usecase = PropertiesUseCase::new(repo, MockJobQueue::new());
        let (properties, total) = usecase
            .list_properties(PageRequest::new(None, None, None, None))
            .await
            .unwrap();

        assert_eq!(total, 1);
        assert_eq!(properties[0].images.len(), 1);
    }
}
