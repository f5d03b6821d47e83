//! SQLite implementation of [`JobStore`].

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection};
use tracing::{debug, info};

use mforge_models::{
    ClaimLane, InputParams, Job, JobId, JobStatus, JobStatusView, JobType, KeyingSettings, NewJob,
    StatusWrite,
};

use crate::db::{self, begin_immediate, DbPool};
use crate::error::{StoreError, StoreResult};
use crate::row::{now_micros, rows_to_jobs, settings_json, JobRow};
use crate::store::{JobStore, PromotionSummary, PurgeScope, SpawnOutcome};

/// New rows are stamped no earlier than one microsecond after the newest
/// row, so `created_at` order always matches insertion order.
const INSERT_SQL: &str = r#"
    INSERT INTO jobs (
        job_type, status, created_at, priority, prompt, input_params,
        keying_settings, result_ref, parent_job_id
    )
    VALUES (
        ?, ?, MAX(?, (SELECT COALESCE(MAX(created_at), 0) + 1 FROM jobs)), ?, ?, ?, ?, ?, ?
    )
    RETURNING id
"#;

/// Single-statement claim: the write lock is taken before the row is chosen.
const CLAIM_SQL: &str = r#"
    UPDATE jobs SET status = ?
    WHERE id = (
        SELECT id FROM jobs
        WHERE status = ?
        ORDER BY priority DESC, created_at ASC, id ASC
        LIMIT 1
    )
    AND status = ?
    RETURNING *
"#;

const LANE_ORDER: &str = "ORDER BY priority DESC, created_at ASC, id ASC";

/// SQLite-backed job store.
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: DbPool,
}

impl SqliteJobStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (and create if missing) the database at `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = db::init_pool(database_url, max_connections).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn insert_job(conn: &mut SqliteConnection, job: &NewJob) -> StoreResult<JobId> {
        let settings = job.keying_settings.as_ref().map(settings_json).transpose()?;

        let id: i64 = sqlx::query_scalar(INSERT_SQL)
            .bind(job.job_type.as_str())
            .bind(job.status.as_str())
            .bind(now_micros())
            .bind(job.priority)
            .bind(job.prompt.as_deref())
            .bind(job.input_params.to_json_string())
            .bind(settings)
            .bind(job.result_ref.as_deref())
            .bind(job.parent_job_id.map(|p| p.0))
            .fetch_one(&mut *conn)
            .await?;

        Ok(JobId(id))
    }

    async fn fetch_job(conn: &mut SqliteConnection, id: JobId) -> StoreResult<Job> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(StoreError::JobNotFound(id))?;
        Job::try_from(row)
    }

    async fn set_keying_queued(
        conn: &mut SqliteConnection,
        id: JobId,
        settings: Option<&KeyingSettings>,
    ) -> StoreResult<()> {
        match settings {
            Some(settings) => {
                sqlx::query(
                    "UPDATE jobs SET status = ?, keying_settings = ?, error_message = NULL WHERE id = ?",
                )
                .bind(JobStatus::KeyingQueued.as_str())
                .bind(settings_json(settings)?)
                .bind(id.0)
                .execute(&mut *conn)
                .await?;
            }
            None => {
                sqlx::query("UPDATE jobs SET status = ?, error_message = NULL WHERE id = ?")
                    .bind(JobStatus::KeyingQueued.as_str())
                    .bind(id.0)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn fetch_list(&self, sql: &str, binds: &[&str]) -> StoreResult<Vec<Job>> {
        let mut query = sqlx::query_as::<Sqlite, JobRow>(sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows_to_jobs(rows)
    }
}

/// SQL list of the job types that can enter the keying lane in bulk.
fn keyable_types_sql() -> String {
    JobType::ALL
        .iter()
        .filter(|t| t.is_keyable())
        .map(|t| format!("'{}'", t.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn init(&self) -> StoreResult<()> {
        db::run_migrations(&self.pool).await
    }

    async fn enqueue(&self, job: NewJob) -> StoreResult<JobId> {
        let mut conn = self.pool.acquire().await?;
        let id = Self::insert_job(&mut conn, &job).await?;
        debug!(job_id = %id, job_type = %job.job_type, status = %job.status, "Job enqueued");
        Ok(id)
    }

    async fn enqueue_many(&self, jobs: Vec<NewJob>) -> StoreResult<Vec<JobId>> {
        let mut tx = begin_immediate(&self.pool).await?;
        let mut ids = Vec::with_capacity(jobs.len());
        for job in &jobs {
            ids.push(Self::insert_job(&mut tx, job).await?);
        }
        tx.commit().await?;
        Ok(ids)
    }

    async fn get(&self, id: JobId) -> StoreResult<Job> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_job(&mut conn, id).await
    }

    async fn get_status(&self, id: JobId) -> StoreResult<JobStatusView> {
        let job = self.get(id).await?;
        Ok(JobStatusView::from(&job))
    }

    async fn claim_next(&self, lane: ClaimLane) -> StoreResult<Option<Job>> {
        let ready = lane.ready_status().as_str();
        let row = sqlx::query_as::<_, JobRow>(CLAIM_SQL)
            .bind(lane.processing_status().as_str())
            .bind(ready)
            .bind(ready)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Job::try_from).transpose()
    }

    async fn apply_write(
        &self,
        id: JobId,
        expected: JobStatus,
        write: &StatusWrite,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?,
                result_ref = COALESCE(?, result_ref),
                keyed_result_ref = COALESCE(?, keyed_result_ref),
                error_message = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(write.status.as_str())
        .bind(write.result_ref.as_deref())
        .bind(write.keyed_result_ref.as_deref())
        .bind(write.error_message.as_deref())
        .bind(id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn promote_to_keying(&self, id: JobId, settings: KeyingSettings) -> StoreResult<()> {
        let mut tx = begin_immediate(&self.pool).await?;
        let job = Self::fetch_job(&mut tx, id).await?;

        if !matches!(
            job.status,
            JobStatus::PendingReview | JobStatus::PendingProcess | JobStatus::Completed
        ) {
            tx.rollback().await?;
            return Err(StoreError::invalid_transition(id, job.status, "enter keying"));
        }
        if job.keying_source().is_none() {
            tx.rollback().await?;
            return Err(StoreError::invalid_request(format!(
                "job {} has no result to key",
                id
            )));
        }

        Self::set_keying_queued(&mut tx, id, Some(&settings)).await?;
        tx.commit().await?;
        info!(job_id = %id, from = %job.status, "Job promoted to keying lane");
        Ok(())
    }

    async fn save_keying_settings(&self, id: JobId, settings: KeyingSettings) -> StoreResult<()> {
        let mut tx = begin_immediate(&self.pool).await?;
        let job = Self::fetch_job(&mut tx, id).await?;

        if !matches!(
            job.status,
            JobStatus::PendingReview
                | JobStatus::PendingProcess
                | JobStatus::Completed
                | JobStatus::Failed
        ) {
            tx.rollback().await?;
            return Err(StoreError::invalid_transition(id, job.status, "save keying settings"));
        }

        sqlx::query("UPDATE jobs SET status = ?, keying_settings = ? WHERE id = ?")
            .bind(JobStatus::PendingProcess.as_str())
            .bind(settings_json(&settings)?)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn promote_all_pending(&self) -> StoreResult<PromotionSummary> {
        let keyable = keyable_types_sql();
        let defaults = settings_json(&KeyingSettings::default())?;
        let mut tx = begin_immediate(&self.pool).await?;

        let saved = sqlx::query("UPDATE jobs SET status = ? WHERE status = ?")
            .bind(JobStatus::KeyingQueued.as_str())
            .bind(JobStatus::PendingProcess.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let reviewed_with_settings = sqlx::query(&format!(
            "UPDATE jobs SET status = ? WHERE status = ? AND job_type IN ({keyable}) \
             AND result_ref IS NOT NULL AND TRIM(COALESCE(keying_settings, '')) != ''"
        ))
        .bind(JobStatus::KeyingQueued.as_str())
        .bind(JobStatus::PendingReview.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let reviewed_default = sqlx::query(&format!(
            "UPDATE jobs SET status = ?, keying_settings = ? WHERE status = ? \
             AND job_type IN ({keyable}) AND result_ref IS NOT NULL"
        ))
        .bind(JobStatus::KeyingQueued.as_str())
        .bind(&defaults)
        .bind(JobStatus::PendingReview.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let rekeyed = sqlx::query(&format!(
            "UPDATE jobs SET status = ? WHERE status = ? AND job_type IN ({keyable}) \
             AND result_ref IS NOT NULL AND TRIM(COALESCE(keying_settings, '')) != ''"
        ))
        .bind(JobStatus::KeyingQueued.as_str())
        .bind(JobStatus::Completed.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        let summary = PromotionSummary {
            custom: saved + reviewed_with_settings + rekeyed,
            default: reviewed_default,
        };
        if summary.total() > 0 {
            info!(
                custom = summary.custom,
                default = summary.default,
                "Promoted pending jobs to keying lane"
            );
        }
        Ok(summary)
    }

    async fn promote_selected(&self, ids: &[JobId]) -> StoreResult<PromotionSummary> {
        let mut summary = PromotionSummary::default();
        let mut tx = begin_immediate(&self.pool).await?;

        for id in ids {
            let job = match Self::fetch_job(&mut tx, *id).await {
                Ok(job) => job,
                Err(StoreError::JobNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let eligible = job.job_type.is_keyable()
                && job.keying_source().is_some()
                && matches!(
                    job.status,
                    JobStatus::PendingReview | JobStatus::Completed | JobStatus::PendingProcess
                );
            if !eligible {
                continue;
            }

            if job.status == JobStatus::PendingProcess || job.keying_settings.is_some() {
                Self::set_keying_queued(&mut tx, *id, None).await?;
                summary.custom += 1;
            } else {
                Self::set_keying_queued(&mut tx, *id, Some(&KeyingSettings::default())).await?;
                summary.default += 1;
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    async fn cancel(&self, id: JobId) -> StoreResult<JobStatus> {
        let mut tx = begin_immediate(&self.pool).await?;
        let job = Self::fetch_job(&mut tx, id).await?;

        if !job.status.is_cancellable() {
            tx.rollback().await?;
            return Err(StoreError::invalid_transition(id, job.status, "be cancelled"));
        }

        let message = format!("Job cancelled by user at {}", Utc::now().to_rfc3339());
        sqlx::query("UPDATE jobs SET status = ?, error_message = ? WHERE id = ?")
            .bind(JobStatus::Failed.as_str())
            .bind(&message)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(job_id = %id, job_type = %job.job_type, from = %job.status, "Job cancelled");
        Ok(job.status)
    }

    async fn reset(&self, id: JobId, status: JobStatus) -> StoreResult<()> {
        if !JobStatus::RESET_TARGETS.contains(&status) {
            return Err(StoreError::invalid_request(format!(
                "cannot reset to '{}'",
                status
            )));
        }

        let result = sqlx::query("UPDATE jobs SET status = ?, error_message = NULL WHERE id = ?")
            .bind(status.as_str())
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(id));
        }
        info!(job_id = %id, to = %status, "Job reset");
        Ok(())
    }

    async fn regenerate(&self, id: JobId) -> StoreResult<JobId> {
        let original = self.get(id).await?;
        if !original.job_type.is_regenerable() {
            return Err(StoreError::invalid_request(format!(
                "job type '{}' cannot be regenerated",
                original.job_type
            )));
        }

        let copy = NewJob {
            prompt: original.prompt.clone(),
            parent_job_id: original.parent_job_id,
            ..NewJob::new(original.job_type, original.input_params.clone())
        };
        self.enqueue(copy).await
    }

    async fn move_to_front(&self, id: JobId) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET priority = (SELECT COALESCE(MAX(priority), 0) + 1 FROM jobs) WHERE id = ?",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(id));
        }
        Ok(())
    }

    async fn list_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        self.fetch_list(
            &format!("SELECT * FROM jobs WHERE status = ? {LANE_ORDER}"),
            &[status.as_str()],
        )
        .await
    }

    async fn list_by_type_and_status(
        &self,
        job_type: JobType,
        status: JobStatus,
    ) -> StoreResult<Vec<Job>> {
        self.fetch_list(
            &format!("SELECT * FROM jobs WHERE job_type = ? AND status = ? {LANE_ORDER}"),
            &[job_type.as_str(), status.as_str()],
        )
        .await
    }

    async fn children_of(&self, parent: JobId, job_type: JobType) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE parent_job_id = ? AND job_type = ? ORDER BY id ASC",
        )
        .bind(parent.0)
        .bind(job_type.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows_to_jobs(rows)
    }

    async fn list_recent(&self, limit: i64) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows_to_jobs(rows)
    }

    async fn counts_by_status(&self) -> StoreResult<Vec<(JobStatus, i64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(status, count)| {
                status
                    .parse::<JobStatus>()
                    .map(|s| (s, count))
                    .map_err(|e| StoreError::corrupt(e.to_string()))
            })
            .collect()
    }

    async fn spawn_stitch_for_parent(
        &self,
        parent: JobId,
        stitch: NewJob,
    ) -> StoreResult<SpawnOutcome> {
        let mut tx = begin_immediate(&self.pool).await?;
        let parent_job = Self::fetch_job(&mut tx, parent).await?;

        if parent_job.status != JobStatus::WaitingForChildren {
            tx.rollback().await?;
            return Ok(SpawnOutcome::ParentNotWaiting);
        }

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM jobs WHERE parent_job_id = ? AND job_type = ? ORDER BY id ASC LIMIT 1",
        )
        .bind(parent.0)
        .bind(JobType::VideoStitching.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some(id) => SpawnOutcome::AlreadyExists(JobId(id)),
            None => {
                let stitch = NewJob {
                    parent_job_id: Some(parent),
                    job_type: JobType::VideoStitching,
                    status: JobStatus::Queued,
                    ..stitch
                };
                SpawnOutcome::Created(Self::insert_job(&mut tx, &stitch).await?)
            }
        };

        sqlx::query("UPDATE jobs SET status = ? WHERE id = ?")
            .bind(JobStatus::Stitching.as_str())
            .bind(parent.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(outcome)
    }

    async fn fail_if(&self, id: JobId, expected: JobStatus, message: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, error_message = ? WHERE id = ? AND status = ?",
        )
        .bind(JobStatus::Failed.as_str())
        .bind(message)
        .bind(id.0)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_waiting(&self, id: JobId, params: &InputParams) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, input_params = ? WHERE id = ? AND status = ?",
        )
        .bind(JobStatus::Queued.as_str())
        .bind(params.to_json_string())
        .bind(id.0)
        .bind(JobStatus::WaitingForAnalysis.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_parent(&self, parent: JobId, result_ref: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, result_ref = ? WHERE id = ? AND status = ?",
        )
        .bind(JobStatus::Completed.as_str())
        .bind(result_ref)
        .bind(parent.0)
        .bind(JobStatus::Stitching.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn purge(&self, scope: PurgeScope) -> StoreResult<u64> {
        let result = match scope {
            PurgeScope::All => sqlx::query("DELETE FROM jobs").execute(&self.pool).await?,
            PurgeScope::Failed => {
                sqlx::query("DELETE FROM jobs WHERE status = ?")
                    .bind(JobStatus::Failed.as_str())
                    .execute(&self.pool)
                    .await?
            }
            PurgeScope::Stuck => {
                sqlx::query("DELETE FROM jobs WHERE status IN (?, ?, ?)")
                    .bind(JobStatus::STUCK[0].as_str())
                    .bind(JobStatus::STUCK[1].as_str())
                    .bind(JobStatus::STUCK[2].as_str())
                    .execute(&self.pool)
                    .await?
            }
        };

        let count = result.rows_affected();
        info!(?scope, count, "Purged jobs");
        Ok(count)
    }
}
