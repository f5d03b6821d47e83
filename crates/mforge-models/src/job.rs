//! Job records and write-back descriptions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{InputParams, JobStatus, JobType, KeyingSettings};

/// Unique identifier for a job, assigned by the store at insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub i64);

impl JobId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A persisted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    /// Claim priority within a lane (higher first)
    pub priority: i64,
    pub prompt: Option<String>,
    pub input_params: InputParams,
    pub keying_settings: Option<KeyingSettings>,
    pub result_ref: Option<String>,
    /// Transparent WebM from the last keying pass. Requested exports are
    /// stored beside it with the same stem: `.gif` and `.tar.gz`.
    pub keyed_result_ref: Option<String>,
    pub error_message: Option<String>,
    pub parent_job_id: Option<JobId>,
}

impl Job {
    /// The artifact a keying pass should consume.
    pub fn keying_source(&self) -> Option<&str> {
        self.result_ref.as_deref().filter(|s| !s.is_empty())
    }

    pub fn prompt_or_empty(&self) -> &str {
        self.prompt.as_deref().unwrap_or("")
    }
}

/// Insertion request for a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NewJob {
    pub job_type: JobType,
    #[serde(default)]
    pub status: JobStatus,
    pub prompt: Option<String>,
    #[serde(default)]
    pub input_params: InputParams,
    pub parent_job_id: Option<JobId>,
    /// Pre-existing artifact (uploaded footage enters review with its source)
    pub result_ref: Option<String>,
    pub keying_settings: Option<KeyingSettings>,
    #[serde(default)]
    pub priority: i64,
}

impl NewJob {
    /// A `queued` job of the given type.
    pub fn new(job_type: JobType, input_params: InputParams) -> Self {
        Self {
            job_type,
            status: JobStatus::Queued,
            prompt: None,
            input_params,
            parent_job_id: None,
            result_ref: None,
            keying_settings: None,
            priority: 0,
        }
    }

    /// Uploaded footage: enters `pending_review` with the upload as its result.
    pub fn uploaded_video(video_ref: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            status: JobStatus::PendingReview,
            prompt: Some(prompt.into()),
            result_ref: Some(video_ref.into()),
            ..Self::new(JobType::UploadedVideoKeying, InputParams::new())
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_parent(mut self, parent: JobId) -> Self {
        self.parent_job_id = Some(parent);
        self
    }
}

/// Snapshot returned to status pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
    pub result_ref: Option<String>,
    pub keyed_result_ref: Option<String>,
    pub error_message: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            result_ref: job.result_ref.clone(),
            keyed_result_ref: job.keyed_result_ref.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

/// Terminal write-back for a claimed job.
///
/// Only the columns set here are touched; `None` leaves a column unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusWrite {
    pub status: JobStatus,
    pub result_ref: Option<String>,
    pub keyed_result_ref: Option<String>,
    pub error_message: Option<String>,
}

impl StatusWrite {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            result_ref: None,
            keyed_result_ref: None,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::status(JobStatus::Failed)
        }
    }

    pub fn with_result(status: JobStatus, result_ref: impl Into<String>) -> Self {
        Self {
            result_ref: Some(result_ref.into()),
            ..Self::status(status)
        }
    }

    pub fn keyed(keyed_result_ref: impl Into<String>) -> Self {
        Self {
            keyed_result_ref: Some(keyed_result_ref.into()),
            ..Self::status(JobStatus::Completed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uploaded_video_enters_review() {
        let job = NewJob::uploaded_video("/static/uploads/a.mp4", "Uploaded a.mp4");
        assert_eq!(job.status, JobStatus::PendingReview);
        assert_eq!(job.job_type, JobType::UploadedVideoKeying);
        assert_eq!(job.result_ref.as_deref(), Some("/static/uploads/a.mp4"));
    }

    #[test]
    fn test_status_write_constructors() {
        let w = StatusWrite::failed("boom");
        assert_eq!(w.status, JobStatus::Failed);
        assert_eq!(w.error_message.as_deref(), Some("boom"));
        assert!(w.result_ref.is_none());

        let w = StatusWrite::keyed("/static/k.webm");
        assert_eq!(w.status, JobStatus::Completed);
        assert!(w.result_ref.is_none());
        assert_eq!(w.keyed_result_ref.as_deref(), Some("/static/k.webm"));
    }

    #[test]
    fn test_job_id_serializes_as_number() {
        assert_eq!(serde_json::to_string(&JobId(42)).unwrap(), "42");
    }
}
