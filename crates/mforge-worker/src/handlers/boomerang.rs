//! Boomerang fan-out: one A->B and one B->A animation under a parent job.
//!
//! The parent only sets up its children here; the dependency resolver
//! stitches them once both complete.

use std::path::PathBuf;

use mforge_media::{job_scratch_dir, prepare_image_file};
use mforge_models::{keys, Job, JobStatus, JobType, NewJob};
use mforge_storage::keys::library_image_key;

use crate::context::{input_file_name, run_blocking, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

pub const DEFAULT_BACKGROUND: &str = "green";

/// The two animation children of `parent`, A->B first.
///
/// Children inherit the parent's parameters minus the automation flag, with
/// the endpoint images set per direction.
pub fn child_jobs(parent: &Job, start_ref: &str, end_ref: &str) -> Vec<NewJob> {
    let mut base = parent.input_params.clone();
    base.remove(keys::BOOMERANG_AUTOMATION);
    let prompt = base
        .str(keys::PROMPT)
        .unwrap_or_else(|| parent.prompt_or_empty())
        .to_string();

    [("A->B", start_ref, end_ref), ("B->A", end_ref, start_ref)]
        .into_iter()
        .map(|(direction, from, to)| {
            let params = base
                .clone()
                .with(keys::IMAGE_URL, from)
                .with(keys::END_IMAGE_URL, to);
            NewJob::new(JobType::Animation, params)
                .with_prompt(format!("Animation {}: {}", direction, prompt))
                .with_parent(parent.id)
        })
        .collect()
}

/// Fetch, prepare and re-store one endpoint image.
///
/// Returns the original reference when the background colour is unsupported.
async fn prepare_endpoint(
    ctx: &WorkerContext,
    reference: &str,
    src: PathBuf,
    dst: PathBuf,
    background: &str,
) -> WorkerResult<String> {
    ctx.fetch_input(reference, &src).await?;

    let background = background.to_string();
    let prepared_path = dst.clone();
    let prepared = run_blocking("image preparation", move || {
        prepare_image_file(&src, &prepared_path, &background)
    })
    .await?;

    if !prepared {
        return Ok(reference.to_string());
    }
    Ok(ctx.blobs.put_file(&dst, &library_image_key("png")).await?)
}

pub async fn handle(ctx: &WorkerContext, job: &Job) -> WorkerResult<JobStatus> {
    let logger = JobLogger::new(job.id, job.job_type, "boomerang_automation");
    let params = &job.input_params;
    let start_ref = params
        .str(keys::IMAGE_URL)
        .ok_or_else(|| WorkerError::invalid_input("Boomerang automation needs a start image."))?;
    let end_ref = params
        .str(keys::END_IMAGE_URL)
        .ok_or_else(|| WorkerError::invalid_input("Boomerang automation needs an end image."))?;
    let background = params.str_or(keys::BACKGROUND, DEFAULT_BACKGROUND);

    logger.log_start(&format!("preparing frames on a {} background", background));
    let scratch = job_scratch_dir(&ctx.config.work_dir, &format!("{}-boomerang", job.id))?;
    let dir = scratch.path();

    let (start, end) = futures::try_join!(
        prepare_endpoint(
            ctx,
            start_ref,
            dir.join(input_file_name("start_src", start_ref, "png")),
            dir.join("start.png"),
            background,
        ),
        prepare_endpoint(
            ctx,
            end_ref,
            dir.join(input_file_name("end_src", end_ref, "png")),
            dir.join("end.png"),
            background,
        )
    )?;

    let children = ctx.store.enqueue_many(child_jobs(job, &start, &end)).await?;
    logger.log_completion(&format!("queued animation children {:?}", children));
    Ok(JobStatus::WaitingForChildren)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mforge_models::{InputParams, JobId};

    fn parent() -> Job {
        Job {
            id: JobId(10),
            job_type: JobType::BoomerangAutomation,
            status: JobStatus::Processing,
            created_at: Utc::now(),
            priority: 0,
            prompt: Some("loop".into()),
            input_params: InputParams::new()
                .with(keys::PROMPT, "spin")
                .with(keys::VIDEO_MODEL, "kwaivgi/kling-v2.1")
                .with(keys::BOOMERANG_AUTOMATION, true)
                .with(keys::IMAGE_URL, "/static/library/a.png")
                .with(keys::END_IMAGE_URL, "/static/library/b.png"),
            keying_settings: None,
            result_ref: None,
            keyed_result_ref: None,
            error_message: None,
            parent_job_id: None,
        }
    }

    #[test]
    fn test_child_jobs_directions() {
        let children = child_jobs(&parent(), "/static/library/a2.png", "/static/library/b2.png");
        assert_eq!(children.len(), 2);

        let ab = &children[0];
        assert_eq!(ab.job_type, JobType::Animation);
        assert_eq!(ab.status, JobStatus::Queued);
        assert_eq!(ab.parent_job_id, Some(JobId(10)));
        assert_eq!(ab.prompt.as_deref(), Some("Animation A->B: spin"));
        assert_eq!(ab.input_params.str(keys::IMAGE_URL), Some("/static/library/a2.png"));
        assert_eq!(ab.input_params.str(keys::END_IMAGE_URL), Some("/static/library/b2.png"));
        assert!(!ab.input_params.contains(keys::BOOMERANG_AUTOMATION));
        assert_eq!(ab.input_params.str(keys::VIDEO_MODEL), Some("kwaivgi/kling-v2.1"));

        let ba = &children[1];
        assert_eq!(ba.prompt.as_deref(), Some("Animation B->A: spin"));
        assert_eq!(ba.input_params.str(keys::IMAGE_URL), Some("/static/library/b2.png"));
        assert_eq!(ba.input_params.str(keys::END_IMAGE_URL), Some("/static/library/a2.png"));
    }

    #[test]
    fn test_child_prompt_falls_back_to_parent_prompt() {
        let mut job = parent();
        job.input_params.remove(keys::PROMPT);
        let children = child_jobs(&job, "a", "b");
        assert_eq!(children[0].prompt.as_deref(), Some("Animation A->B: loop"));
    }
}
