pub mod cloudinary;
pub mod s3;

use std::path::Path;

use crate::{
    domain::media::TransformProfile, repository::errors::UploadError,
    usecase::contracts::MediaUploader,
};

use self::cloudinary::CloudinaryUploader;
use self::s3::S3Uploader;

/// Media store selected at start-up from `MEDIA_BACKEND`.
pub enum MediaBackend {
    Cloudinary(CloudinaryUploader),
    S3(S3Uploader),
}

impl MediaUploader for MediaBackend {
    async fn upload(&self, local_path: &Path, profile: &TransformProfile) -> Result<String, UploadError> {
        match self {
            MediaBackend::Cloudinary(uploader) => uploader.upload(local_path, profile).await,
            MediaBackend::S3(uploader) => uploader.upload(local_path, profile).await,
        }
    }
}
