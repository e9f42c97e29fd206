use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::delivery::http::v1::middleware::ApiClient;
use crate::domain::property::{PageRequest, Property, PropertyWithImages, SortField, SortOrder};
use crate::usecase::error::UsecaseError;
use crate::AppState;

const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePropertyRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: Option<String>,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[validate(length(min = 1, max = 50))]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PropertyResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub city: Option<String>,
    pub price: f64,
    pub status: String,
    pub listed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CreatePropertyResponse {
    pub property: PropertyResponse,
    pub job_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ListPropertiesQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<SortField>,
    pub order: Option<SortOrder>,
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct ListPropertiesResponse {
    pub data: Vec<PropertyResponse>,
    pub meta: PageMeta,
}

fn property_to_response(p: Property, images: Option<Vec<String>>) -> PropertyResponse {
    PropertyResponse {
        id: p.id,
        user_id: p.user_id,
        title: p.title,
        description: p.description,
        city: p.city,
        price: p.price,
        status: p.status,
        listed_at: p.listed_at,
        images,
    }
}

/// Lower-cased extension of an accepted image file name, `None` for anything else.
pub fn image_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Collision-free name for a stored upload: `images-<millis>-<uuid>.<ext>`.
pub fn stored_file_name(ext: &str) -> String {
    format!(
        "images-{}-{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        ext
    )
}

async fn store_uploads(upload_dir: &Path, files: Vec<(String, Bytes)>) -> Result<Vec<String>, UsecaseError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| UsecaseError::Internal(format!("failed to create upload dir: {}", e)))?;

    let mut stored: Vec<String> = Vec::with_capacity(files.len());
    for (ext, bytes) in files {
        let path = upload_dir.join(stored_file_name(&ext));
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            discard_uploads(&stored).await;
            return Err(UsecaseError::Internal(format!("failed to store upload: {}", e)));
        }
        stored.push(path.to_string_lossy().into_owned());
    }

    Ok(stored)
}

/// Removes stored uploads that no job will ever pick up.
async fn discard_uploads(paths: &[String]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path, error = %e, "failed to discard stored upload");
        }
    }
}

#[tracing::instrument(skip_all, fields(user_id = %client.user_id))]
pub async fn create_property(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ApiClient>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, UsecaseError> {
    tracing::debug!("handling create property request");

    let mut request: Option<CreatePropertyRequest> = None;
    let mut files: Vec<(String, Bytes)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UsecaseError::Validation(format!("Failed to read multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        tracing::debug!(field_name = %field_name, "processing multipart field");

        match field_name.as_str() {
            "data" => {
                let bytes = field.bytes().await.map_err(|e| {
                    UsecaseError::Validation(format!("Failed to read property data: {}", e))
                })?;
                let parsed = serde_json::from_slice(&bytes).map_err(|e| {
                    UsecaseError::Validation(format!("Invalid property data: {}", e))
                })?;
                request = Some(parsed);
            }
            "images" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let ext = image_extension(&file_name).ok_or_else(|| {
                    tracing::warn!(file_name = %file_name, "rejected non-image upload");
                    UsecaseError::Validation("Only images are allowed".to_string())
                })?;
                let bytes = field.bytes().await.map_err(|e| {
                    UsecaseError::Validation(format!("Failed to read file: {}", e))
                })?;
                files.push((ext, bytes));
            }
            _ => {
                tracing::debug!(field_name = %field_name, "ignoring unknown multipart field");
            }
        }
    }

    let request = request.ok_or_else(|| {
        tracing::warn!("no 'data' field in multipart request");
        UsecaseError::Validation("Missing 'data' field in multipart request".to_string())
    })?;

    if let Err(validation_errors) = request.validate() {
        tracing::warn!(user_id = %client.user_id, ?validation_errors, "validation failed");
        return Err(UsecaseError::Validation(format!("{:?}", validation_errors)));
    }

    let image_paths = store_uploads(&state.upload_dir, files).await?;
    let property = Property::new(
        client.user_id,
        request.title,
        request.description,
        request.city,
        request.price,
        request.status,
    );

    let created = match state
        .properties_usecase
        .create_property(property, image_paths.clone())
        .await
    {
        Ok(created) => created,
        Err(e) => {
            discard_uploads(&image_paths).await;
            return Err(e);
        }
    };

    tracing::info!(property_id = %created.property.id, job_id = ?created.job_id, "property created");
    Ok((
        StatusCode::CREATED,
        Json(CreatePropertyResponse {
            property: property_to_response(created.property, None),
            job_id: created.job_id,
        }),
    ))
}

#[tracing::instrument(skip(state))]
pub async fn list_properties(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListPropertiesQuery>,
) -> Result<impl IntoResponse, UsecaseError> {
    let page = PageRequest::new(params.page, params.limit, params.sort, params.order);
    tracing::debug!(?page, "handling list properties request");

    let (rows, total) = state.properties_usecase.list_properties(page).await?;
    let data: Vec<PropertyResponse> = rows
        .into_iter()
        .map(|PropertyWithImages { property, images }| property_to_response(property, Some(images)))
        .collect();

    Ok((
        StatusCode::OK,
        Json(ListPropertiesResponse {
            data,
            meta: PageMeta {
                total,
                page: page.page,
                per_page: page.limit,
                total_pages: page.total_pages(total),
            },
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, price: f64) -> CreatePropertyRequest {
        CreatePropertyRequest {
            title: title.to_string(),
            description: None,
            city: Some("Porto".to_string()),
            price,
            status: None,
        }
    }

    #[test]
    fn test_create_property_request_validation() {
        assert!(request("Two-bed apartment", 950.0).validate().is_ok());
        assert!(request("", 950.0).validate().is_err());
        assert!(request("Two-bed apartment", -1.0).validate().is_err());
    }

    #[test]
    fn test_image_extension_filter() {
        assert_eq!(image_extension("front.JPG").as_deref(), Some("jpg"));
        assert_eq!(image_extension("plan.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(image_extension("garden.png").as_deref(), Some("png"));
        assert!(image_extension("notes.pdf").is_none());
        assert!(image_extension("no_extension").is_none());
    }

    #[test]
    fn test_stored_file_names_are_unique() {
        let a = stored_file_name("jpg");
        let b = stored_file_name("jpg");

        assert!(a.starts_with("images-"));
        assert!(a.ends_with(".jpg"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_store_uploads_writes_into_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("uploads");

        let paths = store_uploads(
            &upload_dir,
            vec![
                ("jpg".to_string(), Bytes::from_static(b"one")),
                ("png".to_string(), Bytes::from_static(b"two")),
            ],
        )
        .await
        .unwrap();

        assert_eq!(paths.len(), 2);
        for path in &paths {
            assert!(Path::new(path).starts_with(&upload_dir));
            assert!(Path::new(path).exists());
        }
    }

    #[test]
    fn test_list_response_omits_images_on_create() {
        let property = Property::new(Uuid::new_v4(), "Loft".to_string(), None, None, 10.0, None);
        let json = serde_json::to_value(property_to_response(property, None)).unwrap();
        assert!(json.get("images").is_none());
    }

    #[tokio::test]
    async fn test_discard_uploads_removes_stored_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = store_uploads(dir.path(), vec![("jpg".to_string(), Bytes::from_static(b"one"))])
            .await
            .unwrap();

        discard_uploads(&paths).await;

        assert!(!Path::new(&paths[0]).exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
