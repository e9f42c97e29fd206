use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Property {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub price: f64,
    pub status: String,
    pub listed_at: DateTime<Utc>,
}

impl Property {
    pub fn new(
        user_id: Uuid,
        title: String,
        description: Option<String>,
        city: Option<String>,
        price: f64,
        status: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            description,
            city,
            price,
            status: status.unwrap_or_else(|| "available".to_string()),
            listed_at: Utc::now(),
        }
    }
}

/// Listing row: a property plus the URLs of its recorded images.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PropertyWithImages {
    #[sqlx(flatten)]
    pub property: Property,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub property_id: Uuid,
    pub image_url: String,
    pub idempotency_key: String,
}

impl ImageRecord {
    pub fn new(property_id: Uuid, image_url: String, idempotency_key: String) -> Self {
        Self {
            property_id,
            image_url,
            idempotency_key,
        }
    }

    /// Stable per (property, local path), so a redelivered job maps to the same record.
    pub fn idempotency_key(property_id: Uuid, image_path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(property_id.as_bytes());
        hasher.update(b":");
        hasher.update(image_path.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    ListedAt,
    Price,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::ListedAt => "listed_at",
            SortField::Price => "price",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
    pub sort: SortField,
    pub order: SortOrder,
}

impl PageRequest {
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(page: Option<i64>, limit: Option<i64>, sort: Option<SortField>, order: Option<SortOrder>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(10).clamp(1, Self::MAX_LIMIT),
            sort: sort.unwrap_or(SortField::ListedAt),
            order: order.unwrap_or(SortOrder::Desc),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}
