//! Vision analysis for style, palette and animation-prompt jobs.

use mforge_models::{keys, InputParams, Job};
use mforge_provider::{Artifact, Capability, GenerationRequest, ResponseFormat};

use crate::context::{input_file_name, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

pub const VISION_MODEL: &str = "gpt-4-turbo";
const DEFAULT_SYSTEM_PROMPT: &str = "Analyze this image.";
const MAX_TOKENS: u64 = 500;

/// Provider request for an analysis job, without the image attached.
///
/// JSON mode is requested whenever the system prompt mentions JSON.
pub fn analysis_request(params: &InputParams) -> GenerationRequest {
    let system_prompt = params.str_or(keys::SYSTEM_PROMPT, DEFAULT_SYSTEM_PROMPT);
    let format = if system_prompt.to_lowercase().contains("json") {
        ResponseFormat::JsonObject
    } else {
        ResponseFormat::Text
    };

    GenerationRequest::new(Capability::VisionAnalysis, VISION_MODEL)
        .with_input("system_prompt", system_prompt)
        .with_input("max_tokens", MAX_TOKENS)
        .with_response_format(format)
}

/// Returns the analysis text, stored verbatim as the job's result.
pub async fn handle(ctx: &WorkerContext, job: &Job) -> WorkerResult<String> {
    let logger = JobLogger::new(job.id, job.job_type, "vision_analysis");
    let source = job
        .input_params
        .str(keys::IMAGE_PATH)
        .ok_or_else(|| WorkerError::invalid_input("No image path provided for analysis."))?;

    logger.log_start(&format!("analysing {}", source));
    let bytes = ctx.read_input(source).await?;
    let request = analysis_request(&job.input_params)
        .with_image("image", input_file_name("image", source, "png"), bytes);

    match ctx.provider.generate(request).await? {
        Artifact::Text(text) => {
            logger.log_completion(&format!("{} characters", text.len()));
            Ok(text)
        }
        Artifact::Uri(uri) => Err(WorkerError::processing_failed(format!(
            "{} returned a file instead of text: {}",
            VISION_MODEL, uri
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_is_text_mode() {
        let req = analysis_request(&InputParams::new());
        assert_eq!(req.model, VISION_MODEL);
        assert_eq!(req.input_str("system_prompt"), Some("Analyze this image."));
        assert_eq!(req.response_format, ResponseFormat::Text);
        assert_eq!(req.input["max_tokens"], 500);
    }

    #[test]
    fn test_json_mode_is_case_insensitive() {
        let params = InputParams::new().with(
            keys::SYSTEM_PROMPT,
            "Return the five dominant colours as JSON: {\"palette\": [...]}",
        );
        assert_eq!(analysis_request(&params).response_format, ResponseFormat::JsonObject);
    }
}
