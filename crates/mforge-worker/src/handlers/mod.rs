//! Job handlers and the dispatch table.
//!
//! The claim lane decides first: anything claimed from the keying lane is
//! keyed regardless of its type. Generation-lane jobs route on their type.

pub mod analysis;
pub mod animation;
pub mod boomerang;
pub mod image;
pub mod keying;
pub mod stitching;

use mforge_models::{ClaimLane, Job, JobStatus, JobType};

use crate::context::WorkerContext;
use crate::error::{WorkerError, WorkerResult};

/// What a successful handler produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutput {
    /// Artifact reference or analysis text
    Result(String),
    /// Status the job moves to instead of a result
    Status(JobStatus),
}

/// Run the handler for a claimed job.
///
/// Errors carry the handler's label and become the job's error text.
pub async fn dispatch(ctx: &WorkerContext, lane: ClaimLane, job: &Job) -> WorkerResult<HandlerOutput> {
    match lane {
        ClaimLane::Keying => keying::handle(ctx, job)
            .await
            .map(HandlerOutput::Result)
            .map_err(|e| e.labelled("Keying error")),
        ClaimLane::Generation => dispatch_generation(ctx, job).await,
    }
}

async fn dispatch_generation(ctx: &WorkerContext, job: &Job) -> WorkerResult<HandlerOutput> {
    match job.job_type {
        JobType::ImageGeneration => image::generate(ctx, job)
            .await
            .map(HandlerOutput::Result)
            .map_err(|e| e.labelled("Image generation error")),
        JobType::BackgroundRemoval => image::remove_background(ctx, job)
            .await
            .map(HandlerOutput::Result)
            .map_err(|e| e.labelled("Background removal error")),
        JobType::StyleAnalysis | JobType::PaletteAnalysis | JobType::AnimationPrompting => {
            analysis::handle(ctx, job)
                .await
                .map(HandlerOutput::Result)
                .map_err(|e| e.labelled("Vision analysis error"))
        }
        JobType::Animation => animation::handle(ctx, job)
            .await
            .map(HandlerOutput::Result)
            .map_err(|e| e.labelled("Animation generation error")),
        JobType::VideoStitching => stitching::handle(ctx, job)
            .await
            .map(HandlerOutput::Result)
            .map_err(|e| e.labelled("Video stitching error")),
        JobType::BoomerangAutomation => boomerang::handle(ctx, job)
            .await
            .map(HandlerOutput::Status)
            .map_err(|e| e.labelled("Boomerang automation setup failed")),
        JobType::UploadedVideoKeying => Err(WorkerError::invalid_input(format!(
            "Unknown job type/status: {}/{}",
            job.job_type, job.status
        ))),
    }
}
