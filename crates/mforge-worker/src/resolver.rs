//! Dependency resolver.
//!
//! Two sweeps run once per scheduler tick, both safe to repeat:
//! - fan-out: boomerang parents waiting on their animation children get a
//!   stitch job once both children complete, or fail when one fails
//! - fan-in: jobs gated on analysis jobs are released to `queued` with the
//!   analysis text merged into their parameters

use std::sync::Arc;

use mforge_models::{
    keys, render_analysis_text, InputParams, Job, JobId, JobStatus, JobType, NewJob,
};
use mforge_queue::{JobStore, SpawnOutcome, StoreError};
use tracing::{debug, info, warn};

use crate::error::WorkerResult;
use crate::metrics;

/// Separator between merged analysis texts.
pub const MERGE_SEPARATOR: &str = "\n\n";

/// What one resolver tick changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverReport {
    pub stitches_spawned: usize,
    pub parents_failed: usize,
    pub released: usize,
}

/// What a waiting boomerang parent should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanOutDecision {
    Wait,
    /// Fail the parent with the combined child errors
    Fail(String),
    /// Stitch these two results, in child-id order
    Stitch(String, String),
}

/// Decide a parent's next step from its animation children.
pub fn fan_out_decision(children: &[Job]) -> FanOutDecision {
    if children.len() < 2 {
        return FanOutDecision::Wait;
    }

    let mut sorted: Vec<&Job> = children.iter().collect();
    sorted.sort_by_key(|c| c.id);

    let failures: Vec<String> = sorted
        .iter()
        .filter(|c| c.status == JobStatus::Failed)
        .map(|c| {
            format!(
                "Child job #{} failed: {}",
                c.id,
                c.error_message.as_deref().unwrap_or("unknown error")
            )
        })
        .collect();
    if !failures.is_empty() {
        return FanOutDecision::Fail(failures.join("\n"));
    }

    let mut results = sorted
        .iter()
        .filter(|c| c.status == JobStatus::Completed)
        .filter_map(|c| c.result_ref.as_deref().filter(|r| !r.is_empty()));
    match (results.next(), results.next()) {
        (Some(a), Some(b)) => FanOutDecision::Stitch(a.to_string(), b.to_string()),
        _ => FanOutDecision::Wait,
    }
}

/// The stitch job for `parent`.
pub fn stitch_job(parent: &Job, video_a: &str, video_b: &str) -> NewJob {
    let params = InputParams::new()
        .with(keys::VIDEO_A_PATH, video_a)
        .with(keys::VIDEO_B_PATH, video_b);
    NewJob::new(JobType::VideoStitching, params)
        .with_prompt(format!("Stitched Loop: {}", parent.prompt_or_empty()))
        .with_parent(parent.id)
}

/// Fold completed analysis results into `params`.
///
/// Existing text in the target field comes first, then each analysis in
/// ascending job id order. Palette documents are rendered as colour lists.
pub fn merge_analysis(params: &InputParams, analyses: &[Job]) -> InputParams {
    let target = params.merge_target().to_string();

    let mut sorted: Vec<&Job> = analyses.iter().collect();
    sorted.sort_by_key(|j| j.id);

    let parts: Vec<String> = params
        .str(&target)
        .map(str::to_string)
        .into_iter()
        .chain(
            sorted
                .iter()
                .filter_map(|j| j.result_ref.as_deref())
                .map(render_analysis_text)
                .filter(|t| !t.is_empty()),
        )
        .collect();

    let mut merged = params.clone();
    merged.set(&target, parts.join(MERGE_SEPARATOR));
    merged
}

/// Resolves fan-out and fan-in dependencies between jobs.
pub struct DependencyResolver {
    store: Arc<dyn JobStore>,
}

impl DependencyResolver {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Run both sweeps.
    pub async fn tick(&self) -> WorkerResult<ResolverReport> {
        let mut report = self.sweep_fan_out().await?;
        report.released = self.sweep_fan_in().await?;
        Ok(report)
    }

    pub async fn sweep_fan_out(&self) -> WorkerResult<ResolverReport> {
        let mut report = ResolverReport::default();
        let parents = self
            .store
            .list_by_type_and_status(JobType::BoomerangAutomation, JobStatus::WaitingForChildren)
            .await?;

        for parent in parents {
            let children = self.store.children_of(parent.id, JobType::Animation).await?;
            match fan_out_decision(&children) {
                FanOutDecision::Wait => {}
                FanOutDecision::Fail(message) => {
                    if self
                        .store
                        .fail_if(parent.id, JobStatus::WaitingForChildren, &message)
                        .await?
                    {
                        warn!(job_id = %parent.id, "Boomerang parent failed: {}", message);
                        metrics::record_parent_failed();
                        report.parents_failed += 1;
                    }
                }
                FanOutDecision::Stitch(a, b) => {
                    let outcome = self
                        .store
                        .spawn_stitch_for_parent(parent.id, stitch_job(&parent, &a, &b))
                        .await?;
                    match outcome {
                        SpawnOutcome::Created(stitch_id) => {
                            info!(
                                job_id = %parent.id,
                                "Spawned stitch job {} for boomerang parent", stitch_id
                            );
                            metrics::record_stitch_spawned();
                            report.stitches_spawned += 1;
                        }
                        SpawnOutcome::AlreadyExists(stitch_id) => {
                            debug!(
                                job_id = %parent.id,
                                "Stitch job {} already exists, parent moved to stitching", stitch_id
                            );
                        }
                        SpawnOutcome::ParentNotWaiting => {}
                    }
                }
            }
        }
        Ok(report)
    }

    /// Release every waiting job whose analysis jobs have all completed.
    ///
    /// Jobs whose analyses failed or disappeared keep waiting.
    pub async fn sweep_fan_in(&self) -> WorkerResult<usize> {
        let mut released = 0;
        let waiting = self.store.list_by_status(JobStatus::WaitingForAnalysis).await?;

        for job in waiting {
            let ids = job.input_params.analysis_job_ids();
            let Some(analyses) = self.completed_analyses(job.id, &ids).await? else {
                continue;
            };

            let merged = merge_analysis(&job.input_params, &analyses);
            if self.store.release_waiting(job.id, &merged).await? {
                info!(
                    job_id = %job.id,
                    "Released job after {} analysis results", analyses.len()
                );
                metrics::record_release();
                released += 1;
            }
        }
        Ok(released)
    }

    /// All of `ids` as completed jobs, or `None` while any is outstanding.
    async fn completed_analyses(&self, waiting: JobId, ids: &[JobId]) -> WorkerResult<Option<Vec<Job>>> {
        let mut analyses = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.get(*id).await {
                Ok(job) if job.status == JobStatus::Completed => analyses.push(job),
                Ok(_) => return Ok(None),
                Err(StoreError::JobNotFound(_)) => {
                    debug!(job_id = %waiting, "Analysis job {} does not exist", id);
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Some(analyses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mforge_models::{ClaimLane, StatusWrite};
    use mforge_queue::SqliteJobStore;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, Arc<SqliteJobStore>) {
        let dir = TempDir::new().unwrap();
        let url = format!(
            "sqlite:{}?mode=rwc",
            dir.path().join("jobs.db").to_string_lossy()
        );
        let store = SqliteJobStore::connect(&url, 4).await.unwrap();
        store.init().await.unwrap();
        (dir, Arc::new(store))
    }

    fn parent_job() -> NewJob {
        NewJob::new(JobType::BoomerangAutomation, InputParams::new())
            .with_prompt("loop")
            .with_status(JobStatus::WaitingForChildren)
    }

    fn child(parent: JobId, status: JobStatus, result: Option<&str>) -> NewJob {
        let mut job = NewJob::new(JobType::Animation, InputParams::new())
            .with_parent(parent)
            .with_status(status);
        job.result_ref = result.map(str::to_string);
        job
    }

    fn completed(job_type: JobType, result: &str) -> NewJob {
        let mut job = NewJob::new(job_type, InputParams::new()).with_status(JobStatus::Completed);
        job.result_ref = Some(result.to_string());
        job
    }

    #[tokio::test]
    async fn test_fan_out_spawns_exactly_one_stitch() {
        let (_dir, store) = test_store().await;
        let parent = store.enqueue(parent_job()).await.unwrap();
        store
            .enqueue_many(vec![
                child(parent, JobStatus::Completed, Some("/static/ab.mp4")),
                child(parent, JobStatus::Completed, Some("/static/ba.mp4")),
            ])
            .await
            .unwrap();

        let resolver = DependencyResolver::new(store.clone());
        let report = resolver.tick().await.unwrap();
        assert_eq!(report.stitches_spawned, 1);
        assert_eq!(store.get(parent).await.unwrap().status, JobStatus::Stitching);

        let stitches = store.children_of(parent, JobType::VideoStitching).await.unwrap();
        assert_eq!(stitches.len(), 1);
        let stitch = &stitches[0];
        assert_eq!(stitch.status, JobStatus::Queued);
        assert_eq!(stitch.prompt.as_deref(), Some("Stitched Loop: loop"));
        assert_eq!(stitch.input_params.str(keys::VIDEO_A_PATH), Some("/static/ab.mp4"));
        assert_eq!(stitch.input_params.str(keys::VIDEO_B_PATH), Some("/static/ba.mp4"));

        // A repeated tick is a no-op
        let report = resolver.tick().await.unwrap();
        assert_eq!(report, ResolverReport::default());
        assert_eq!(
            store.children_of(parent, JobType::VideoStitching).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_fan_out_waits_for_both_children() {
        let (_dir, store) = test_store().await;
        let parent = store.enqueue(parent_job()).await.unwrap();
        store
            .enqueue_many(vec![
                child(parent, JobStatus::Completed, Some("/static/ab.mp4")),
                child(parent, JobStatus::Queued, None),
            ])
            .await
            .unwrap();

        let report = DependencyResolver::new(store.clone()).tick().await.unwrap();
        assert_eq!(report.stitches_spawned, 0);
        assert_eq!(store.get(parent).await.unwrap().status, JobStatus::WaitingForChildren);
    }

    #[tokio::test]
    async fn test_fan_out_failed_child_fails_parent() {
        let (_dir, store) = test_store().await;
        let parent = store.enqueue(parent_job()).await.unwrap();
        let ids = store
            .enqueue_many(vec![
                child(parent, JobStatus::Completed, Some("/static/ab.mp4")),
                child(parent, JobStatus::Queued, None),
            ])
            .await
            .unwrap();
        assert!(store
            .fail_if(ids[1], JobStatus::Queued, "Animation generation error: NSFW")
            .await
            .unwrap());

        let report = DependencyResolver::new(store.clone()).tick().await.unwrap();
        assert_eq!(report.parents_failed, 1);

        let parent = store.get(parent).await.unwrap();
        assert_eq!(parent.status, JobStatus::Failed);
        assert_eq!(
            parent.error_message,
            Some(format!("Child job #{} failed: Animation generation error: NSFW", ids[1]))
        );
        assert!(store
            .children_of(parent.id, JobType::VideoStitching)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_fan_in_releases_after_all_analyses() {
        let (_dir, store) = test_store().await;
        let style = store
            .enqueue(completed(JobType::StyleAnalysis, "loose watercolor washes"))
            .await
            .unwrap();
        let palette = store
            .enqueue(NewJob::new(JobType::PaletteAnalysis, InputParams::new()))
            .await
            .unwrap();
        let params = InputParams::new()
            .with(keys::OBJECT_PROMPT, "teapot")
            .with(keys::STYLE_PROMPT, "storybook")
            .with(keys::ANALYSIS_JOB_IDS, vec![palette.0, style.0]);
        let waiting = store
            .enqueue(
                NewJob::new(JobType::ImageGeneration, params).with_status(JobStatus::WaitingForAnalysis),
            )
            .await
            .unwrap();

        let resolver = DependencyResolver::new(store.clone());
        assert_eq!(resolver.tick().await.unwrap().released, 0);
        assert_eq!(store.get(waiting).await.unwrap().status, JobStatus::WaitingForAnalysis);

        let claimed = store.claim_next(ClaimLane::Generation).await.unwrap().unwrap();
        assert_eq!(claimed.id, palette);
        let palette_json = r##"{"palette": [{"hex": "#112233", "name": "navy"}, {"hex": "#FFEEDD", "name": "cream"}]}"##;
        assert!(store
            .apply_write(
                palette,
                JobStatus::Processing,
                &StatusWrite::with_result(JobStatus::Completed, palette_json),
            )
            .await
            .unwrap());

        assert_eq!(resolver.tick().await.unwrap().released, 1);
        let job = store.get(waiting).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(
            job.input_params.str(keys::STYLE_PROMPT),
            Some("storybook\n\nloose watercolor washes\n\nnavy (#112233), cream (#FFEEDD)")
        );

        assert_eq!(resolver.tick().await.unwrap().released, 0);
    }

    #[tokio::test]
    async fn test_fan_in_keeps_waiting_on_failed_analysis() {
        let (_dir, store) = test_store().await;
        let analysis = store
            .enqueue(NewJob::new(JobType::StyleAnalysis, InputParams::new()))
            .await
            .unwrap();
        store.fail_if(analysis, JobStatus::Queued, "boom").await.unwrap();

        let params = InputParams::new().with(keys::ANALYSIS_JOB_IDS, vec![analysis.0, 9999]);
        let waiting = store
            .enqueue(
                NewJob::new(JobType::ImageGeneration, params).with_status(JobStatus::WaitingForAnalysis),
            )
            .await
            .unwrap();

        assert_eq!(
            DependencyResolver::new(store.clone()).tick().await.unwrap().released,
            0
        );
        assert_eq!(store.get(waiting).await.unwrap().status, JobStatus::WaitingForAnalysis);
    }

    #[test]
    fn test_merge_into_custom_target_without_existing_text() {
        let params = InputParams::new().with(keys::MERGE_TARGET, "system_prompt");
        let analysis = Job {
            id: JobId(3),
            job_type: JobType::AnimationPrompting,
            status: JobStatus::Completed,
            created_at: chrono::Utc::now(),
            priority: 0,
            prompt: None,
            input_params: InputParams::new(),
            keying_settings: None,
            result_ref: Some("slow turntable spin".into()),
            keyed_result_ref: None,
            error_message: None,
            parent_job_id: None,
        };
        let merged = merge_analysis(&params, &[analysis]);
        assert_eq!(merged.str("system_prompt"), Some("slow turntable spin"));
        assert!(merged.str(keys::STYLE_PROMPT).is_none());
    }
}
