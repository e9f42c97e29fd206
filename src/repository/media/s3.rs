use std::io::Cursor;
use std::path::Path;

use anyhow::Context;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use uuid::Uuid;

use crate::{
    domain::media::TransformProfile, repository::errors::UploadError,
    usecase::contracts::MediaUploader,
};

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub public_base_url: String,
    pub jpeg_quality: u8,
}

/// Resizes to cover the profile box, center-crops the overflow and re-encodes as JPEG.
pub fn fill_to_profile(data: &[u8], profile: &TransformProfile, quality: u8) -> Result<Vec<u8>, UploadError> {
    let img = image::load_from_memory(data)
        .map_err(|e| UploadError::Processing(format!("failed to decode image: {}", e)))?;

    tracing::debug!(
        original_width = img.width(),
        original_height = img.height(),
        target_width = profile.width,
        target_height = profile.height,
        "filling image to profile"
    );

    let filled = img
        .resize_to_fill(profile.width, profile.height, FilterType::Lanczos3)
        .to_rgb8();

    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&filled)
        .map_err(|e| UploadError::Processing(format!("failed to encode JPEG: {}", e)))?;

    Ok(buf.into_inner())
}

/// Uploader for S3-compatible stores (MinIO in development). Transforms locally before upload.
pub struct S3Uploader {
    client: S3Client,
    settings: S3Settings,
}

impl S3Uploader {
    pub async fn connect(settings: S3Settings) -> anyhow::Result<Self> {
        let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .endpoint_url(&settings.endpoint)
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(aws_sdk_s3::config::Credentials::new(
                &settings.access_key,
                &settings.secret_key,
                None,
                None,
                "env",
            ))
            .load()
            .await;
        let client = S3Client::from_conf(
            aws_sdk_s3::Config::from(&s3_config)
                .to_builder()
                .force_path_style(true)
                .build(),
        );
        tracing::info!(endpoint = %settings.endpoint, "S3 client configured");

        ensure_bucket(&client, &settings.bucket).await?;

        Ok(Self { client, settings })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.settings.public_base_url.trim_end_matches('/'), key)
    }
}

impl MediaUploader for S3Uploader {
    #[tracing::instrument(skip(self, profile), fields(path = %local_path.display()))]
    async fn upload(&self, local_path: &Path, profile: &TransformProfile) -> Result<String, UploadError> {
        let data = tokio::fs::read(local_path)
            .await
            .map_err(|e| UploadError::InvalidFile {
                path: local_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let transform = profile.clone();
        let quality = self.settings.jpeg_quality;
        let encoded = tokio::task::spawn_blocking(move || fill_to_profile(&data, &transform, quality))
            .await
            .map_err(|e| UploadError::Processing(e.to_string()))??;

        let key = if profile.folder.is_empty() {
            format!("{}.jpg", Uuid::new_v4())
        } else {
            format!("{}/{}.jpg", profile.folder, Uuid::new_v4())
        };

        self.client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(&key)
            .body(ByteStream::from(encoded))
            .content_type("image/jpeg")
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        tracing::debug!(bucket = %self.settings.bucket, key = %key, "uploaded object to S3");
        Ok(self.public_url(&key))
    }
}

async fn ensure_bucket(s3_client: &S3Client, bucket: &str) -> anyhow::Result<()> {
    if s3_client.head_bucket().bucket(bucket).send().await.is_ok() {
        tracing::info!(bucket = bucket, "bucket already exists");
        return Ok(());
    }

    tracing::info!(bucket = bucket, "creating bucket");
    s3_client
        .create_bucket()
        .bucket(bucket)
        .send()
        .await
        .context("failed to create bucket")?;

    let policy = serde_json::json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"AWS": ["*"]},
            "Action": ["s3:GetObject"],
            "Resource": [format!("arn:aws:s3:::{}/*", bucket)]
        }]
    });

    s3_client
        .put_bucket_policy()
        .bucket(bucket)
        .policy(policy.to_string())
        .send()
        .await
        .context("failed to set bucket policy")?;
    tracing::info!(bucket = bucket, "bucket policy set to public-read");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 10, 10])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_fill_to_profile_crops_to_exact_box() {
        let profile = TransformProfile::fill_center(30, 10, "listings");
        let output = fill_to_profile(&png_bytes(40, 40), &profile, 85).unwrap();

        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.width(), 30);
        assert_eq!(decoded.height(), 10);
    }

    #[test]
    fn test_fill_to_profile_rejects_garbage() {
        let profile = TransformProfile::fill_center(30, 10, "listings");
        let err = fill_to_profile(b"definitely not an image", &profile, 85).unwrap_err();
        assert!(matches!(err, UploadError::Processing(_)));
    }
}
