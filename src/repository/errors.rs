use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue unavailable: {0}")]
    Unavailable(String),
    #[error("Queue serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        QueueError::Serialization(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("invalid file {path}: {reason}")]
    InvalidFile { path: String, reason: String },
    #[error("media store request failed: {0}")]
    Network(String),
    #[error("media store rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("image processing failed: {0}")]
    Processing(String),
}
