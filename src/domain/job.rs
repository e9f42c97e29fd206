use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Queue name shared by the API (producer) and the image worker (consumer).
pub const IMAGE_UPLOAD_JOB: &str = "image-upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Delayed => "delayed",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a finished job went. The queue status stays `completed` either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    PartiallyFailed,
}

/// Result of processing a single image path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOutcome {
    Recorded { image_url: String },
    AlreadyRecorded,
    OwnerMissing,
    UploadFailed,
    RecordFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: usize,
    pub processed: usize,
    pub recorded: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
}

impl JobProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &PathOutcome) {
        self.processed += 1;
        match outcome {
            PathOutcome::Recorded { .. } | PathOutcome::AlreadyRecorded => self.recorded += 1,
            PathOutcome::OwnerMissing => self.skipped += 1,
            PathOutcome::UploadFailed | PathOutcome::RecordFailed => self.failed += 1,
        }
    }

    pub fn finish(&mut self) -> JobOutcome {
        let outcome = if self.recorded == self.total {
            JobOutcome::Completed
        } else {
            JobOutcome::PartiallyFailed
        };
        self.outcome = Some(outcome);
        outcome
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub data: serde_json::Value,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: JobProgress,
    #[serde(default)]
    pub attempts_made: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            data,
            status: JobStatus::Waiting,
            progress: JobProgress::default(),
            attempts_made: 0,
            failed_reason: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn mark_active(&mut self, attempt: u32) {
        self.status = JobStatus::Active;
        self.attempts_made = attempt;
    }

    pub fn mark_completed(&mut self, progress: JobProgress) {
        self.status = JobStatus::Completed;
        self.progress = progress;
        self.failed_reason = None;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_delayed(&mut self, reason: String) {
        self.status = JobStatus::Delayed;
        self.failed_reason = Some(reason);
    }

    pub fn mark_failed(&mut self, reason: String) {
        self.status = JobStatus::Failed;
        self.failed_reason = Some(reason);
        self.finished_at = Some(Utc::now());
    }
}

/// `imagePaths` may be sent as a list or as a single path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImagePaths {
    Many(Vec<String>),
    One(String),
}

impl ImagePaths {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            ImagePaths::Many(paths) => paths,
            ImagePaths::One(path) => vec![path],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageUploadPayload {
    pub image_paths: ImagePaths,
    pub user_id: Uuid,
    pub property_id: Uuid,
}

impl ImageUploadPayload {
    pub fn new(image_paths: Vec<String>, user_id: Uuid, property_id: Uuid) -> Self {
        Self {
            image_paths: ImagePaths::Many(image_paths),
            user_id,
            property_id,
        }
    }

    pub fn from_job_data(data: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(data)
    }
}

/// What to do with a job whose processing attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Retry(Duration),
    DeadLetter,
}

/// Exponential backoff with a fixed attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after `attempt` failed, or `None` when the budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1).min(16);
        Some(self.base_delay.saturating_mul(1u32 << exponent))
    }

    pub fn after_failure(&self, attempt: u32) -> FailureAction {
        match self.next_delay(attempt) {
            Some(delay) => FailureAction::Retry(delay),
            None => FailureAction::DeadLetter,
        }
    }

    /// A delivery past the budget only happens when an earlier attempt never reported back.
    pub fn is_exhausted(&self, delivery: u32) -> bool {
        delivery > self.max_attempts
    }

    /// One delivery beyond the budget so abandoned final attempts still reach the worker to be failed.
    pub fn broker_max_deliver(&self) -> i64 {
        i64::from(self.max_attempts) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_accepts_path_list() {
        let user_id = Uuid::new_v4();
        let property_id = Uuid::new_v4();
        let data = json!({
            "imagePaths": ["/tmp/a.jpg", "/tmp/b.jpg"],
            "userId": user_id,
            "propertyId": property_id,
        });

        let payload = ImageUploadPayload::from_job_data(&data).unwrap();
        assert_eq!(payload.user_id, user_id);
        assert_eq!(payload.property_id, property_id);
        assert_eq!(
            payload.image_paths.into_vec(),
            vec!["/tmp/a.jpg".to_string(), "/tmp/b.jpg".to_string()]
        );
    }

    #[test]
    fn test_payload_single_path_becomes_list() {
        let data = json!({
            "imagePaths": "/tmp/a.jpg",
            "userId": Uuid::new_v4(),
            "propertyId": Uuid::new_v4(),
        });

        let payload = ImageUploadPayload::from_job_data(&data).unwrap();
        assert_eq!(payload.image_paths.into_vec(), vec!["/tmp/a.jpg".to_string()]);
    }

    #[test]
    fn test_payload_without_image_paths_is_rejected() {
        let data = json!({ "userId": Uuid::new_v4(), "propertyId": Uuid::new_v4() });
        assert!(ImageUploadPayload::from_job_data(&data).is_err());
    }

    #[test]
    fn test_payload_with_null_image_paths_is_rejected() {
        let data = json!({
            "imagePaths": null,
            "userId": Uuid::new_v4(),
            "propertyId": Uuid::new_v4(),
        });
        assert!(ImageUploadPayload::from_job_data(&data).is_err());
    }

    #[test]
    fn test_payload_serializes_camel_case() {
        let payload = ImageUploadPayload::new(vec!["a.jpg".to_string()], Uuid::new_v4(), Uuid::new_v4());
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("imagePaths").is_some());
        assert!(value.get("userId").is_some());
        assert!(value.get("propertyId").is_some());
    }

    #[test]
    fn test_progress_outcome() {
        let mut progress = JobProgress::new(2);
        progress.record(&PathOutcome::Recorded {
            image_url: "https://cdn/a.jpg".to_string(),
        });
        progress.record(&PathOutcome::UploadFailed);

        assert_eq!(progress.processed, 2);
        assert_eq!(progress.recorded, 1);
        assert_eq!(progress.failed, 1);
        assert_eq!(progress.finish(), JobOutcome::PartiallyFailed);
        assert_eq!(progress.outcome, Some(JobOutcome::PartiallyFailed));
    }

    #[test]
    fn test_progress_empty_job_completes() {
        let mut progress = JobProgress::new(0);
        assert_eq!(progress.finish(), JobOutcome::Completed);
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = Job::new(IMAGE_UPLOAD_JOB, json!({}));
        assert_eq!(job.status, JobStatus::Waiting);
        assert!(!job.is_finished());

        job.mark_active(1);
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.attempts_made, 1);

        job.mark_delayed("boom".to_string());
        assert_eq!(job.status, JobStatus::Delayed);
        assert_eq!(job.failed_reason.as_deref(), Some("boom"));

        job.mark_active(2);
        job.mark_completed(JobProgress::new(0));
        assert!(job.is_finished());
        assert!(job.failed_reason.is_none());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_job_status_labels() {
        assert_eq!(JobStatus::Waiting.to_string(), "waiting");
        assert_eq!(
            serde_json::to_value(JobStatus::Completed).unwrap(),
            json!("completed")
        );
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };

        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_failure_retries_until_budget_then_dead_letters() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };

        assert_eq!(policy.after_failure(1), FailureAction::Retry(Duration::from_millis(100)));
        assert_eq!(policy.after_failure(2), FailureAction::Retry(Duration::from_millis(200)));
        assert_eq!(policy.after_failure(3), FailureAction::DeadLetter);
    }

    #[test]
    fn test_abandoned_final_attempt_is_redelivered_once_then_exhausted() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };

        assert_eq!(policy.broker_max_deliver(), 4);
        assert!(!policy.is_exhausted(1));
        assert!(!policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }
}
