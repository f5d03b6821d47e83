//! Job lifecycle states and claim lanes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Job processing status.
///
/// The set is closed: the store rejects any other value on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the generation lane
    #[default]
    Queued,
    /// Claimed from the generation lane
    Processing,
    /// Waiting in the keying lane
    KeyingQueued,
    /// Claimed from the keying lane
    KeyingProcessing,
    /// Generated output awaiting manual review
    PendingReview,
    /// Keying settings saved, awaiting promotion
    PendingProcess,
    /// Gated on upstream analysis jobs
    WaitingForAnalysis,
    /// Fan-out parent waiting on its children
    WaitingForChildren,
    /// Fan-out parent whose stitch job has been spawned
    Stitching,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: &'static [JobStatus] = &[
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::KeyingQueued,
        JobStatus::KeyingProcessing,
        JobStatus::PendingReview,
        JobStatus::PendingProcess,
        JobStatus::WaitingForAnalysis,
        JobStatus::WaitingForChildren,
        JobStatus::Stitching,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    /// Statuses an external caller may cancel.
    pub const CANCELLABLE: &'static [JobStatus] = &[
        JobStatus::Processing,
        JobStatus::KeyingProcessing,
        JobStatus::Stitching,
        JobStatus::Queued,
        JobStatus::KeyingQueued,
    ];

    /// In-flight statuses left behind when a worker dies mid-job.
    pub const STUCK: &'static [JobStatus] = &[
        JobStatus::Processing,
        JobStatus::KeyingProcessing,
        JobStatus::Stitching,
    ];

    /// Targets accepted by a manual reset.
    pub const RESET_TARGETS: &'static [JobStatus] = &[
        JobStatus::Queued,
        JobStatus::PendingReview,
        JobStatus::Failed,
        JobStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::KeyingQueued => "keying_queued",
            JobStatus::KeyingProcessing => "keying_processing",
            JobStatus::PendingReview => "pending_review",
            JobStatus::PendingProcess => "pending_process",
            JobStatus::WaitingForAnalysis => "waiting_for_analysis",
            JobStatus::WaitingForChildren => "waiting_for_children",
            JobStatus::Stitching => "stitching",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_cancellable(&self) -> bool {
        Self::CANCELLABLE.contains(self)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| JobStatusParseError(s.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("Unknown job status: {0}")]
pub struct JobStatusParseError(String);

/// Priority lane a job is claimed from.
///
/// Keying work always preempts generation work regardless of age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClaimLane {
    Keying,
    Generation,
}

impl ClaimLane {
    /// Lanes in claim-priority order.
    pub const PRIORITY_ORDER: &'static [ClaimLane] = &[ClaimLane::Keying, ClaimLane::Generation];

    /// Status a job must be in to be claimable from this lane.
    pub fn ready_status(&self) -> JobStatus {
        match self {
            ClaimLane::Keying => JobStatus::KeyingQueued,
            ClaimLane::Generation => JobStatus::Queued,
        }
    }

    /// Status a claimed job is flipped to.
    pub fn processing_status(&self) -> JobStatus {
        match self {
            ClaimLane::Keying => JobStatus::KeyingProcessing,
            ClaimLane::Generation => JobStatus::Processing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimLane::Keying => "keying",
            ClaimLane::Generation => "generation",
        }
    }
}

impl fmt::Display for ClaimLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
