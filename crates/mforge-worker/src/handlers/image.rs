//! Still image generation and background removal.

use mforge_models::{keys, InputParams, Job};
use mforge_provider::{Capability, GenerationRequest};
use mforge_storage::keys::library_image_key;

use crate::context::{input_file_name, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

pub const SEEDREAM_MODEL_ID: &str = "bytedance-seedream-4";
pub const GPT_IMAGE_MODEL_ID: &str = "replicate-gpt-image-1";
/// Used when a job names no model
pub const DEFAULT_MODEL_ID: &str = "b24e16ff-06e3-43eb-8d33-4416c2d75876";
pub const BACKGROUND_REMOVAL_MODEL: &str = "bria/remove-background";

const DEFAULT_NEGATIVE_PROMPT: &str = "text, watermark, blurry, deformed, distorted, ugly, signature";

/// Provider request for an `image_generation` job, routed on `modelId`.
pub fn image_request(params: &InputParams) -> WorkerResult<GenerationRequest> {
    let object = params
        .str(keys::OBJECT_PROMPT)
        .ok_or_else(|| WorkerError::invalid_input("No object prompt provided for image generation."))?;
    let style = params
        .str(keys::STYLE_PROMPT)
        .ok_or_else(|| WorkerError::invalid_input("No style prompt provided for image generation."))?;

    let request = match params.str(keys::MODEL_ID) {
        Some(SEEDREAM_MODEL_ID) => GenerationRequest::new(Capability::TextToImage, "bytedance/seedream-4")
            .with_input(
                "prompt",
                format!(
                    "professional product shot of a {}, in the style of {}, centered, \
                     on a solid bright green flat neutral background, no shadows",
                    object, style
                ),
            )
            .with_input("size", "1K")
            .with_input("aspect_ratio", "1:1"),
        Some(GPT_IMAGE_MODEL_ID) => GenerationRequest::new(Capability::TextToImage, "openai/gpt-image-1")
            .with_input("prompt", format!("{}, in the style of {}", object, style))
            .with_input("background", "transparent")
            .with_input("quality", "high")
            .with_input("output_format", "png")
            .with_input("aspect_ratio", "1:1"),
        other => GenerationRequest::new(Capability::TextToImage, other.unwrap_or(DEFAULT_MODEL_ID))
            .with_input(
                "prompt",
                format!(
                    "{}, in the style of {}, centered, professional product shot",
                    object, style
                ),
            )
            .with_input("presetStyle", params.str_or(keys::PRESET_STYLE, "NONE"))
            .with_input("height", 1024)
            .with_input("width", 1024)
            .with_input("num_images", 1)
            .with_input("transparency", "foreground_only")
            .with_input("negative_prompt", DEFAULT_NEGATIVE_PROMPT),
    };
    Ok(request)
}

/// `image_generation`: text-to-image, re-stored under `library/`.
pub async fn generate(ctx: &WorkerContext, job: &Job) -> WorkerResult<String> {
    let logger = JobLogger::new(job.id, job.job_type, "image_generation");
    let request = image_request(&job.input_params)?;
    logger.log_start(&format!("calling {}", request.model));

    let artifact = ctx.provider.generate(request).await?;
    let uri = ctx.store_artifact(artifact, &library_image_key("png")).await?;

    logger.log_completion(&uri);
    Ok(uri)
}

/// `background_removal`: source image in, transparent PNG out.
pub async fn remove_background(ctx: &WorkerContext, job: &Job) -> WorkerResult<String> {
    let logger = JobLogger::new(job.id, job.job_type, "background_removal");
    let source = job
        .input_params
        .str(keys::IMAGE_PATH)
        .ok_or_else(|| WorkerError::invalid_input("No image path provided for background removal."))?;

    logger.log_start(&format!("removing background from {}", source));
    let bytes = ctx.read_input(source).await?;
    let request = GenerationRequest::new(Capability::BackgroundRemoval, BACKGROUND_REMOVAL_MODEL)
        .with_image("image", input_file_name("image", source, "png"), bytes);

    let artifact = ctx.provider.generate(request).await?;
    let uri = ctx.store_artifact(artifact, &library_image_key("png")).await?;

    logger.log_completion(&uri);
    Ok(uri)
}
