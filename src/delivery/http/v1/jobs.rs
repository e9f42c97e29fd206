use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::job::{Job, JobProgress, JobStatus};
use crate::usecase::error::UsecaseError;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJobsResponse {
    pub message: &'static str,
    pub active_job_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: Uuid,
    pub data: serde_json::Value,
    pub status: JobStatus,
    pub progress: JobProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            data: job.data,
            status: job.status,
            progress: job.progress,
            failed_reason: job.failed_reason,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub result: JobView,
}

#[tracing::instrument(skip(state))]
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, UsecaseError> {
    let active_job_ids = state.jobs_usecase.active_jobs().await?;

    Ok(Json(ActiveJobsResponse {
        message: "active jobs",
        active_job_ids,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, UsecaseError> {
    let job = state.jobs_usecase.get_job(&id).await?;
    tracing::debug!(job_id = %job.id, status = %job.status, "job found");

    Ok(Json(JobResponse { result: job.into() }))
}
