//! Job store error types.

use mforge_models::{JobId, JobStatus};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {id} cannot {action} from status '{status}'")]
    InvalidTransition {
        id: JobId,
        status: JobStatus,
        action: &'static str,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Corrupt job row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn invalid_transition(id: JobId, status: JobStatus, action: &'static str) -> Self {
        Self::InvalidTransition { id, status, action }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }

    /// SQLite lock contention that outlived the busy timeout.
    pub fn is_busy(&self) -> bool {
        match self {
            StoreError::Database(e) => {
                let msg = e.to_string().to_ascii_lowercase();
                msg.contains("database is locked") || msg.contains("database is busy")
            }
            _ => false,
        }
    }
}
