use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::repository::errors::{QueueError, RepositoryError};

#[derive(Debug, Error)]
pub enum UsecaseError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<RepositoryError> for UsecaseError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::DatabaseError(msg) => UsecaseError::Internal(msg),
        }
    }
}

impl From<QueueError> for UsecaseError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Unavailable(msg) => UsecaseError::Unavailable(msg),
            QueueError::Serialization(msg) => UsecaseError::Internal(msg),
        }
    }
}

impl UsecaseError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            UsecaseError::NotFound(_) => StatusCode::NOT_FOUND,
            UsecaseError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            UsecaseError::Forbidden(_) => StatusCode::FORBIDDEN,
            UsecaseError::Validation(_) => StatusCode::BAD_REQUEST,
            UsecaseError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            UsecaseError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UsecaseError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        match &self {
            UsecaseError::Internal(_) | UsecaseError::Unavailable(_) => {
                tracing::error!(error = %self, "server error");
            }
            UsecaseError::NotFound(_) => {
                tracing::warn!(error = %self, "resource not found");
            }
            UsecaseError::Unauthorized(_) | UsecaseError::Forbidden(_) => {
                tracing::warn!(error = %self, "request rejected");
            }
            _ => {
                tracing::debug!(error = %self);
            }
        }

        // Internal details stay in the logs.
        let message = match &self {
            UsecaseError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        (status, axum::Json(serde_json::json!({ "message": message }))).into_response()
    }
}
