use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::{
    domain::media::TransformProfile, repository::errors::UploadError,
    usecase::contracts::MediaUploader,
};

#[derive(Debug, Clone)]
pub struct CloudinarySettings {
    pub api_base_url: String,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Signs upload parameters: sorted `key=value` pairs joined by `&`, secret appended, SHA-256.
fn sign(params: &[(&'static str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub struct CloudinaryUploader {
    http_client: reqwest::Client,
    settings: CloudinarySettings,
}

impl CloudinaryUploader {
    pub fn new(settings: CloudinarySettings, timeout: Duration) -> Result<Self, UploadError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Network(e.to_string()))?;

        tracing::info!(cloud_name = %settings.cloud_name, "CloudinaryUploader created");

        Ok(Self {
            http_client,
            settings,
        })
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/{}/image/upload",
            self.settings.api_base_url.trim_end_matches('/'),
            self.settings.cloud_name
        )
    }
}

impl MediaUploader for CloudinaryUploader {
    #[tracing::instrument(skip(self, profile), fields(path = %local_path.display()))]
    async fn upload(&self, local_path: &Path, profile: &TransformProfile) -> Result<String, UploadError> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| UploadError::InvalidFile {
                path: local_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        let mut params: Vec<(&'static str, String)> = vec![
            ("timestamp", Utc::now().timestamp().to_string()),
            ("transformation", profile.to_transformation()),
        ];
        if !profile.folder.is_empty() {
            params.push(("folder", profile.folder.clone()));
        }
        let signature = sign(&params, &self.settings.api_secret);

        let mut form = Form::new();
        for (key, value) in params {
            form = form.text(key, value);
        }
        let form = form
            .text("api_key", self.settings.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
            .part("file", Part::bytes(bytes).file_name(file_name));

        tracing::debug!(url = %self.upload_url(), "uploading image");

        let response = self
            .http_client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        tracing::debug!(secure_url = %body.secure_url, "image uploaded");
        Ok(body.secure_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn uploader(base_url: String) -> CloudinaryUploader {
        CloudinaryUploader::new(
            CloudinarySettings {
                api_base_url: base_url,
                cloud_name: "demo".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_sign_is_order_independent() {
        let a = sign(
            &[("timestamp", "1".to_string()), ("folder", "f".to_string())],
            "secret",
        );
        let b = sign(
            &[("folder", "f".to_string()), ("timestamp", "1".to_string())],
            "secret",
        );

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_sign_depends_on_secret() {
        let params = [("timestamp", "1".to_string())];
        assert_ne!(sign(&params, "one"), sign(&params, "two"));
    }

    #[tokio::test]
    async fn test_upload_returns_secure_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/image/upload"))
            .and(body_string_contains("c_fill,g_center,h_630,w_1200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "secure_url": "https://res.cloudinary.com/demo/image/upload/listings/a.jpg"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"fake image").unwrap();

        let profile = TransformProfile::fill_center(1200, 630, "listings");
        let url = uploader(server.uri()).upload(&file, &profile).await.unwrap();

        assert_eq!(url, "https://res.cloudinary.com/demo/image/upload/listings/a.jpg");
    }

    #[tokio::test]
    async fn test_upload_rejected_by_remote() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/image/upload"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "Invalid image file" }
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"not an image").unwrap();

        let profile = TransformProfile::fill_center(1200, 630, "listings");
        let err = uploader(server.uri()).upload(&file, &profile).await.unwrap_err();

        match err {
            UploadError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid image file");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let profile = TransformProfile::fill_center(1200, 630, "listings");
        let err = uploader(server.uri())
            .upload(&dir.path().join("missing.jpg"), &profile)
            .await
            .unwrap_err();

        assert!(matches!(err, UploadError::InvalidFile { .. }));
    }
}
