//! Structured job logging.
//!
//! Every lifecycle event of a claimed job carries the job id, its type and
//! the lane it was claimed from.

use mforge_models::{ClaimLane, Job, JobId, JobType};
use tracing::{error, info, warn, Span};

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
    job_type: JobType,
    operation: String,
}

impl JobLogger {
    /// Create a logger for `job_id` performing `operation`.
    pub fn new(job_id: JobId, job_type: JobType, operation: &str) -> Self {
        Self {
            job_id,
            job_type,
            operation: operation.to_string(),
        }
    }

    /// Logger for a job claimed from `lane`.
    ///
    /// Keying-lane jobs are logged as `keying` whatever their type.
    pub fn for_claim(lane: ClaimLane, job: &Job) -> Self {
        let operation = match lane {
            ClaimLane::Keying => "keying",
            ClaimLane::Generation => job.job_type.as_str(),
        };
        Self::new(job.id, job.job_type, operation)
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            job_type = %self.job_type,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping everything the job's task does.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            job_type = %self.job_type,
            operation = %self.operation
        )
    }
}
