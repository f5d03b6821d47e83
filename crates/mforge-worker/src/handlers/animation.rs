//! Image-to-video generation.
//!
//! Request shaping depends on the model family: Kling takes a duration and,
//! for v2.1, a quality mode; Seedance takes duration, resolution and aspect
//! ratio and names its start frame `image`.

use mforge_models::{keys, InputParams, Job};
use mforge_provider::{Capability, GenerationRequest};
use mforge_storage::keys::generated_animation_key;

use crate::context::{input_file_name, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// Appended to every negative prompt.
pub const NEGATIVE_PROMPT_SUFFIX: &str = "contact shadow, drop shadow, change background color";

/// An input frame attached to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

fn negative_prompt(params: &InputParams) -> String {
    match params.str(keys::NEGATIVE_PROMPT) {
        Some(user) => format!("{}, {}", user, NEGATIVE_PROMPT_SUFFIX),
        None => NEGATIVE_PROMPT_SUFFIX.to_string(),
    }
}

/// Provider request for an `animation` job.
///
/// `fallback_prompt` is used when the parameters carry no prompt.
pub fn animation_request(
    params: &InputParams,
    fallback_prompt: &str,
    start: SourceImage,
    end: Option<SourceImage>,
) -> WorkerResult<GenerationRequest> {
    let model = params
        .str(keys::VIDEO_MODEL)
        .ok_or_else(|| WorkerError::invalid_input("No video model provided for animation."))?;
    let family = model.to_ascii_lowercase();
    let is_kling = family.contains("kling");
    let is_kling_v21 = is_kling && family.contains("v2.1");
    let is_seedance = family.contains("seedance");

    let mut request = GenerationRequest::new(Capability::ImageToVideo, model)
        .with_input("prompt", params.str_or(keys::PROMPT, fallback_prompt))
        .with_input("negative_prompt", negative_prompt(params));

    if is_kling {
        request = request.with_input("duration", params.u64(keys::KLING_DURATION).unwrap_or(5));
        if is_kling_v21 {
            request = request.with_input("mode", params.str_or(keys::KLING_MODE, "pro"));
        }
    }
    if is_seedance {
        request = request
            .with_input("duration", params.u64(keys::SEEDANCE_DURATION).unwrap_or(5))
            .with_input("resolution", params.str_or(keys::SEEDANCE_RESOLUTION, "1080p"))
            .with_input("aspect_ratio", params.str_or(keys::SEEDANCE_ASPECT_RATIO, "1:1"));
    }

    let start_field = if is_seedance { "image" } else { "start_image" };
    let end = if params.bool(keys::SEAMLESS_LOOP) {
        Some(start.clone())
    } else {
        end
    };
    request = request.with_image(start_field, start.filename, start.bytes);

    if let Some(end) = end {
        request = request.with_image("end_image", end.filename, end.bytes);
        if family.contains("kling-v2.1") {
            request = request.with_input("mode", "pro");
        }
    }
    Ok(request)
}

pub async fn handle(ctx: &WorkerContext, job: &Job) -> WorkerResult<String> {
    let logger = JobLogger::new(job.id, job.job_type, "animation");
    let params = &job.input_params;
    let start_ref = params
        .str(keys::IMAGE_URL)
        .ok_or_else(|| WorkerError::invalid_input("No start image provided for animation."))?;

    let start = SourceImage {
        filename: input_file_name("start", start_ref, "png"),
        bytes: ctx.read_input(start_ref).await?,
    };

    let end = match params.str(keys::END_IMAGE_URL) {
        Some(end_ref) => match ctx.read_input(end_ref).await {
            Ok(bytes) => Some(SourceImage {
                filename: input_file_name("end", end_ref, "png"),
                bytes,
            }),
            Err(e) => {
                logger.log_warning(&format!("end image {} unavailable, ignoring: {}", end_ref, e));
                None
            }
        },
        None => None,
    };

    let request = animation_request(params, job.prompt_or_empty(), start, end)?;
    logger.log_start(&format!("calling {}", request.model));

    let artifact = ctx.provider.generate(request).await?;
    let uri = ctx.store_artifact(artifact, &generated_animation_key()).await?;

    logger.log_completion(&uri);
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> SourceImage {
        SourceImage {
            filename: name.to_string(),
            bytes: name.as_bytes().to_vec(),
        }
    }

    fn params(model: &str) -> InputParams {
        InputParams::new()
            .with(keys::VIDEO_MODEL, model)
            .with(keys::PROMPT, "spin")
    }

    #[test]
    fn test_negative_prompt_suffix() {
        let req = animation_request(&params("m"), "", image("a.png"), None).unwrap();
        assert_eq!(req.input_str("negative_prompt"), Some(NEGATIVE_PROMPT_SUFFIX));

        let p = params("m").with(keys::NEGATIVE_PROMPT, "blur");
        let req = animation_request(&p, "", image("a.png"), None).unwrap();
        assert_eq!(
            req.input_str("negative_prompt"),
            Some("blur, contact shadow, drop shadow, change background color")
        );
    }

    #[test]
    fn test_kling_v21_defaults() {
        let req = animation_request(&params("kwaivgi/kling-v2.1"), "", image("a.png"), None).unwrap();
        assert_eq!(req.input["duration"], 5);
        assert_eq!(req.input_str("mode"), Some("pro"));
        assert!(req.has_image("start_image"));
        assert!(!req.has_image("end_image"));
    }

    #[test]
    fn test_kling_custom_mode_forced_pro_with_end_image() {
        let p = params("kwaivgi/kling-v2.1")
            .with(keys::KLING_MODE, "standard")
            .with(keys::KLING_DURATION, "10");
        let req = animation_request(&p, "", image("a.png"), None).unwrap();
        assert_eq!(req.input_str("mode"), Some("standard"));
        assert_eq!(req.input["duration"], 10);

        let req = animation_request(&p, "", image("a.png"), Some(image("b.png"))).unwrap();
        assert_eq!(req.input_str("mode"), Some("pro"));
        assert!(req.has_image("end_image"));
    }

    #[test]
    fn test_older_kling_has_no_mode() {
        let req = animation_request(&params("kwaivgi/kling-v1.6-pro"), "", image("a.png"), None).unwrap();
        assert_eq!(req.input["duration"], 5);
        assert!(req.input_str("mode").is_none());
    }

    #[test]
    fn test_seedance_shape() {
        let req = animation_request(&params("bytedance/seedance-1-pro"), "", image("a.png"), None).unwrap();
        assert_eq!(req.input["duration"], 5);
        assert_eq!(req.input_str("resolution"), Some("1080p"));
        assert_eq!(req.input_str("aspect_ratio"), Some("1:1"));
        assert!(req.has_image("image"));
        assert!(!req.has_image("start_image"));
    }

    #[test]
    fn test_seamless_loop_reuses_start_frame() {
        let p = params("some/model").with(keys::SEAMLESS_LOOP, true);
        let req = animation_request(&p, "", image("a.png"), Some(image("b.png"))).unwrap();
        let end = req.images.iter().find(|i| i.field == "end_image").unwrap();
        assert_eq!(end.filename, "a.png");
    }

    #[test]
    fn test_prompt_falls_back_to_job_prompt() {
        let p = InputParams::new().with(keys::VIDEO_MODEL, "m");
        let req = animation_request(&p, "wobble", image("a.png"), None).unwrap();
        assert_eq!(req.input_str("prompt"), Some("wobble"));

        let err = animation_request(&InputParams::new(), "", image("a.png"), None).unwrap_err();
        assert_eq!(err.to_string(), "No video model provided for animation.");
    }
}
