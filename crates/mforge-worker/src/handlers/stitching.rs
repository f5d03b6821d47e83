//! Two clips in, one clip out.

use mforge_media::{job_scratch_dir, stitch_videos};
use mforge_models::{keys, Job};
use mforge_storage::keys::stitched_animation_key;

use crate::context::{input_file_name, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

pub async fn handle(ctx: &WorkerContext, job: &Job) -> WorkerResult<String> {
    let logger = JobLogger::new(job.id, job.job_type, "video_stitching");
    let params = &job.input_params;
    let video_a = params
        .str(keys::VIDEO_A_PATH)
        .ok_or_else(|| WorkerError::invalid_input("No source video A provided for stitching."))?;
    let video_b = params
        .str(keys::VIDEO_B_PATH)
        .ok_or_else(|| WorkerError::invalid_input("No source video B provided for stitching."))?;

    let scratch = job_scratch_dir(&ctx.config.work_dir, &format!("{}-stitch", job.id))?;
    let input_a = scratch.path().join(input_file_name("a", video_a, "mp4"));
    let input_b = scratch.path().join(input_file_name("b", video_b, "mp4"));

    logger.log_start(&format!("stitching {} + {}", video_a, video_b));
    futures::try_join!(
        ctx.fetch_input(video_a, &input_a),
        ctx.fetch_input(video_b, &input_b)
    )?;

    let output = scratch.path().join("stitched.mp4");
    let report = stitch_videos(
        ctx.runner.as_ref(),
        &[input_a, input_b],
        &output,
        scratch.path(),
        &ctx.config.stitch_config(),
    )
    .await?;
    logger.log_progress(&format!(
        "{} bytes via {}",
        report.output_bytes,
        report.strategy.as_str()
    ));

    let uri = ctx.blobs.put_file(&output, &stitched_animation_key()).await?;
    logger.log_completion(&uri);
    Ok(uri)
}
