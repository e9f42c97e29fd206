use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::{
    domain::property::{ImageRecord, PageRequest, Property, PropertyWithImages},
    repository::errors::RepositoryError,
    usecase::contracts::{ApiKeyRepository, PropertyImageStore, PropertyRepository},
};

#[derive(Clone)]
pub struct PostgresPropertyRepository {
    pool: PgPool,
}

impl PostgresPropertyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PropertyRepository for PostgresPropertyRepository {
    #[tracing::instrument(skip(self, property), fields(property_id = %property.id, user_id = %property.user_id))]
    async fn create(&self, property: &Property) -> Result<Property, RepositoryError> {
        tracing::debug!("creating property");

        let created = sqlx::query_as::<_, Property>(
            r#"
            INSERT INTO properties (id, user_id, title, description, city, price, status, listed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, user_id, title, description, city, price, status, listed_at
            "#
        )
        .bind(property.id)
        .bind(property.user_id)
        .bind(&property.title)
        .bind(&property.description)
        .bind(&property.city)
        .bind(property.price)
        .bind(&property.status)
        .bind(property.listed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        tracing::debug!(property_id = %created.id, "property created successfully");
        Ok(created)
    }

    #[tracing::instrument(skip(self), fields(page = page.page, limit = page.limit))]
    async fn list(&self, page: &PageRequest) -> Result<(Vec<PropertyWithImages>, i64), RepositoryError> {
        tracing::debug!("listing properties");

        // Column and direction come from closed enums, never from raw input.
        let query = format!(
            r#"
            SELECT p.id, p.user_id, p.title, p.description, p.city, p.price, p.status, p.listed_at,
                   COALESCE(
                       array_agg(i.image_url ORDER BY i.id) FILTER (WHERE i.image_url IS NOT NULL),
                       '{{}}'::text[]
                   ) AS images
            FROM properties p
            LEFT JOIN images i ON i.property_id = p.id
            GROUP BY p.id
            ORDER BY p.{} {}
            LIMIT $1 OFFSET $2
            "#,
            page.sort.column(),
            page.order.keyword()
        );

        let rows = sqlx::query_as::<_, PropertyWithImages>(&query)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM properties")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        tracing::debug!(count = rows.len(), total, "found properties");
        Ok((rows, total))
    }
}

impl PropertyImageStore for PostgresPropertyRepository {
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM profiles WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(exists)
    }

    #[tracing::instrument(skip(self))]
    async fn image_recorded(&self, idempotency_key: &str) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM images WHERE idempotency_key = $1)")
                .bind(idempotency_key)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(exists)
    }

    #[tracing::instrument(skip(self, record), fields(property_id = %record.property_id))]
    async fn record_image(&self, record: &ImageRecord) -> Result<(), RepositoryError> {
        tracing::debug!(image_url = %record.image_url, "recording image");

        let result = sqlx::query(
            r#"
            INSERT INTO images (property_id, image_url, idempotency_key)
            VALUES ($1, $2, $3)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#
        )
        .bind(record.property_id)
        .bind(&record.image_url)
        .bind(&record.idempotency_key)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        if result.rows_affected() == 0 {
            tracing::debug!("image already recorded for idempotency key");
        }
        Ok(())
    }
}

impl ApiKeyRepository for PostgresPropertyRepository {
    #[tracing::instrument(skip(self, key))]
    async fn find_owner(&self, key: &str) -> Result<Option<Uuid>, RepositoryError> {
        let owner: Option<Uuid> = sqlx::query_scalar("SELECT user_id FROM api_keys WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(e.to_string()))?;

        Ok(owner)
    }
}

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
