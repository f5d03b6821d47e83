//! Job store interface.
//!
//! The store is the single source of truth for job state. Every mutation is
//! an atomic operation here; no caller holds a raw connection.

use async_trait::async_trait;

use mforge_models::{
    ClaimLane, InputParams, Job, JobId, JobStatus, JobStatusView, JobType, KeyingSettings, NewJob,
    StatusWrite,
};

use crate::error::StoreResult;

/// Result of a fan-out stitch spawn attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// A new stitch job was inserted and the parent moved to `stitching`
    Created(JobId),
    /// A stitch job for this parent already existed; the parent was moved to `stitching`
    AlreadyExists(JobId),
    /// The parent was no longer waiting for children
    ParentNotWaiting,
}

/// Which jobs a purge removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeScope {
    All,
    Failed,
    /// `processing`, `keying_processing` and `stitching`
    Stuck,
}

/// Counts returned by a bulk promotion into the keying lane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionSummary {
    /// Jobs queued with settings the user saved
    pub custom: u64,
    /// Jobs queued with default settings
    pub default: u64,
}

impl PromotionSummary {
    pub fn total(&self) -> u64 {
        self.custom + self.default
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create the schema if needed.
    async fn init(&self) -> StoreResult<()>;

    async fn enqueue(&self, job: NewJob) -> StoreResult<JobId>;

    /// Insert several jobs in one transaction, preserving their order.
    async fn enqueue_many(&self, jobs: Vec<NewJob>) -> StoreResult<Vec<JobId>>;

    async fn get(&self, id: JobId) -> StoreResult<Job>;

    async fn get_status(&self, id: JobId) -> StoreResult<JobStatusView>;

    /// Atomically flip the highest-priority, oldest ready job of `lane` to
    /// its processing status and return the post-transition row.
    async fn claim_next(&self, lane: ClaimLane) -> StoreResult<Option<Job>>;

    /// Claim from the keying lane first, then the generation lane.
    async fn claim_prioritized(&self) -> StoreResult<Option<(ClaimLane, Job)>> {
        for lane in ClaimLane::PRIORITY_ORDER {
            if let Some(job) = self.claim_next(*lane).await? {
                return Ok(Some((*lane, job)));
            }
        }
        Ok(None)
    }

    /// Write a claimed job's terminal state.
    ///
    /// Applied only while the job is still in `expected`; returns `false`
    /// when the job moved on meanwhile (for example it was cancelled).
    async fn apply_write(
        &self,
        id: JobId,
        expected: JobStatus,
        write: &StatusWrite,
    ) -> StoreResult<bool>;

    /// Move a reviewed or completed job into the keying lane.
    async fn promote_to_keying(&self, id: JobId, settings: KeyingSettings) -> StoreResult<()>;

    /// Store settings and park the job in `pending_process`.
    async fn save_keying_settings(&self, id: JobId, settings: KeyingSettings) -> StoreResult<()>;

    /// Promote every pending job into the keying lane.
    async fn promote_all_pending(&self) -> StoreResult<PromotionSummary>;

    /// Promote the given jobs into the keying lane; unsuitable ids are skipped.
    async fn promote_selected(&self, ids: &[JobId]) -> StoreResult<PromotionSummary>;

    /// Best-effort cancel. Returns the status the job was cancelled from.
    async fn cancel(&self, id: JobId) -> StoreResult<JobStatus>;

    /// Manually reset a job to one of [`JobStatus::RESET_TARGETS`], clearing its error.
    async fn reset(&self, id: JobId, status: JobStatus) -> StoreResult<()>;

    /// Re-insert a copy of a regenerable job as `queued`.
    async fn regenerate(&self, id: JobId) -> StoreResult<JobId>;

    /// Give a job the highest priority in its lane.
    async fn move_to_front(&self, id: JobId) -> StoreResult<()>;

    async fn list_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>>;

    async fn list_by_type_and_status(
        &self,
        job_type: JobType,
        status: JobStatus,
    ) -> StoreResult<Vec<Job>>;

    /// Children of `parent` with the given type, ordered by id.
    async fn children_of(&self, parent: JobId, job_type: JobType) -> StoreResult<Vec<Job>>;

    /// Most recent jobs first.
    async fn list_recent(&self, limit: i64) -> StoreResult<Vec<Job>>;

    async fn counts_by_status(&self) -> StoreResult<Vec<(JobStatus, i64)>>;

    /// Insert `stitch` under `parent` unless one exists, and move the parent
    /// from `waiting_for_children` to `stitching`, in one transaction.
    async fn spawn_stitch_for_parent(&self, parent: JobId, stitch: NewJob)
        -> StoreResult<SpawnOutcome>;

    /// Fail a job only if it is still in `expected`.
    async fn fail_if(&self, id: JobId, expected: JobStatus, message: &str) -> StoreResult<bool>;

    /// Release a `waiting_for_analysis` job to `queued` with merged params.
    async fn release_waiting(&self, id: JobId, params: &InputParams) -> StoreResult<bool>;

    /// Complete a `stitching` fan-out parent with the stitched result.
    async fn complete_parent(&self, parent: JobId, result_ref: &str) -> StoreResult<bool>;

    /// Delete jobs. External housekeeping only.
    async fn purge(&self, scope: PurgeScope) -> StoreResult<u64>;
}
