use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::domain::job::RetryPolicy;
use crate::domain::media::TransformProfile;
use crate::repository::media::cloudinary::CloudinarySettings;
use crate::repository::media::s3::S3Settings;
use crate::repository::nats::QueueSettings;
use crate::telemetry::TelemetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackendKind {
    Cloudinary,
    S3,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_nats_url")]
    pub nats_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_media_backend")]
    pub media_backend: MediaBackendKind,
    #[serde(default)]
    pub cloudinary_cloud_name: String,
    #[serde(default)]
    pub cloudinary_api_key: String,
    #[serde(default)]
    pub cloudinary_api_secret: String,
    #[serde(default = "default_cloudinary_api_base_url")]
    pub cloudinary_api_base_url: String,
    #[serde(default = "default_media_folder")]
    pub media_folder: String,
    #[serde(default = "default_image_width")]
    pub image_width: u32,
    #[serde(default = "default_image_height")]
    pub image_height: u32,
    #[serde(default = "default_minio_endpoint")]
    pub minio_endpoint: String,
    #[serde(default = "default_minio_access_key")]
    pub minio_access_key: String,
    #[serde(default = "default_minio_secret_key")]
    pub minio_secret_key: String,
    #[serde(default = "default_minio_bucket")]
    pub minio_bucket: String,
    #[serde(default = "default_photo_base_url")]
    pub photo_base_url: String,
    #[serde(default = "default_photo_quality")]
    pub photo_quality: u8,
    #[serde(default = "default_media_timeout_secs")]
    pub media_timeout_secs: u64,
    #[serde(default = "default_queue_max_attempts")]
    pub queue_max_attempts: u32,
    #[serde(default = "default_queue_backoff_ms")]
    pub queue_backoff_ms: u64,
    #[serde(default = "default_queue_ack_wait_secs")]
    pub queue_ack_wait_secs: u64,
    #[serde(default = "default_job_retention_hours")]
    pub job_retention_hours: u64,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,
    #[serde(default)]
    pub telemetry_enabled: bool,
    #[serde(default = "default_telemetry_service_version")]
    pub telemetry_service_version: String,
    #[serde(default = "default_telemetry_environment")]
    pub telemetry_environment: String,
    #[serde(default = "default_telemetry_otlp_endpoint")]
    pub telemetry_otlp_endpoint: String,
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_media_backend() -> MediaBackendKind {
    MediaBackendKind::Cloudinary
}

fn default_cloudinary_api_base_url() -> String {
    "https://api.cloudinary.com/v1_1".to_string()
}

fn default_media_folder() -> String {
    "listings".to_string()
}

fn default_image_width() -> u32 {
    1200
}

fn default_image_height() -> u32 {
    630
}

fn default_minio_endpoint() -> String {
    "http://minio:9000".to_string()
}

fn default_minio_access_key() -> String {
    "minioadmin".to_string()
}

fn default_minio_secret_key() -> String {
    "minioadmin".to_string()
}

fn default_minio_bucket() -> String {
    "listings".to_string()
}

fn default_photo_base_url() -> String {
    "/photos".to_string()
}

fn default_photo_quality() -> u8 {
    85
}

fn default_media_timeout_secs() -> u64 {
    60
}

fn default_queue_max_attempts() -> u32 {
    3
}

fn default_queue_backoff_ms() -> u64 {
    1000
}

fn default_queue_ack_wait_secs() -> u64 {
    120
}

fn default_job_retention_hours() -> u64 {
    168
}

fn default_worker_concurrency() -> usize {
    1
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_telemetry_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_telemetry_environment() -> String {
    "production".to_string()
}

fn default_telemetry_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::default())
    }

    pub fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(environment)
            .build()?
            .try_deserialize()
    }

    pub fn transform_profile(&self) -> TransformProfile {
        TransformProfile::fill_center(self.image_width, self.image_height, self.media_folder.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.queue_max_attempts.max(1),
            base_delay: Duration::from_millis(self.queue_backoff_ms),
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            stream_name: "IMAGE_JOBS".to_string(),
            bucket: "image-jobs".to_string(),
            retention: Duration::from_secs(self.job_retention_hours * 3600),
            ack_wait: Duration::from_secs(self.queue_ack_wait_secs),
            retry: self.retry_policy(),
        }
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media_timeout_secs)
    }

    pub fn cloudinary_settings(&self) -> CloudinarySettings {
        CloudinarySettings {
            api_base_url: self.cloudinary_api_base_url.clone(),
            cloud_name: self.cloudinary_cloud_name.clone(),
            api_key: self.cloudinary_api_key.clone(),
            api_secret: self.cloudinary_api_secret.clone(),
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            endpoint: self.minio_endpoint.clone(),
            access_key: self.minio_access_key.clone(),
            secret_key: self.minio_secret_key.clone(),
            bucket: self.minio_bucket.clone(),
            public_base_url: self.photo_base_url.clone(),
            jpeg_quality: self.photo_quality,
        }
    }

    pub fn telemetry_config(&self, service_name: &str) -> TelemetryConfig {
        TelemetryConfig {
            service_name: service_name.to_string(),
            service_version: self.telemetry_service_version.clone(),
            environment: self.telemetry_environment.clone(),
            otlp_endpoint: self.telemetry_otlp_endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let map = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::default().source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let config =
            AppConfig::from_environment(environment(&[("DATABASE_URL", "postgres://localhost/listings")]))
                .unwrap();

        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.media_backend, MediaBackendKind::Cloudinary);
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.worker_concurrency, 1);
        assert_eq!(
            config.transform_profile(),
            TransformProfile::fill_center(1200, 630, "listings")
        );
        assert_eq!(config.retry_policy().max_attempts, 3);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_environment(environment(&[
            ("DATABASE_URL", "postgres://localhost/listings"),
            ("MEDIA_BACKEND", "s3"),
            ("IMAGE_WIDTH", "800"),
            ("QUEUE_MAX_ATTEMPTS", "5"),
            ("QUEUE_BACKOFF_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.media_backend, MediaBackendKind::S3);
        assert_eq!(config.transform_profile().width, 800);
        assert_eq!(
            config.retry_policy(),
            RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(250),
            }
        );
    }

    #[test]
    fn test_missing_database_url_is_an_error() {
        assert!(AppConfig::from_environment(environment(&[])).is_err());
    }
}
