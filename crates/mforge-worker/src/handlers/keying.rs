//! Keying pass: decode, key, optional sticker effects and posterize, encode
//! to transparent WebM, plus the requested exports.

use std::path::Path;

use mforge_media::{
    encode_alpha_video, ensure_min_size, export_gif, job_scratch_dir, key_frame_set,
    posterize_frames, preview_key, write_frame_archive, MediaError, StickerPipeline,
    StickerTextures, TextureSequence,
};
use mforge_models::{EffectSettings, Job, KeyingSettings, Validate};
use mforge_storage::keys::{keyed_output_stem, keying_preview_key};

use crate::context::{input_file_name, run_blocking, WorkerContext};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

fn validated(settings: &KeyingSettings) -> WorkerResult<()> {
    settings
        .validate()
        .map_err(|e| WorkerError::invalid_input(format!("Invalid keying settings: {}", e)))
}

async fn load_texture(
    ctx: &WorkerContext,
    reference: &str,
    dir: &Path,
    tag: &str,
    size: (u32, u32),
) -> WorkerResult<TextureSequence> {
    let path = dir.join(input_file_name(&format!("texture_{}", tag), reference, "mp4"));
    ctx.fetch_input(reference, &path).await?;
    let frames_dir = dir.join(format!("texture_{}_frames", tag));
    Ok(TextureSequence::load(ctx.runner.as_ref(), &path, &frames_dir, size.0, size.1).await?)
}

async fn load_textures(
    ctx: &WorkerContext,
    effects: &EffectSettings,
    dir: &Path,
    size: (u32, u32),
) -> WorkerResult<StickerTextures> {
    let mut textures = StickerTextures::default();
    if let Some(d) = &effects.displacement {
        textures.displacement = Some(load_texture(ctx, &d.texture_uri, dir, "displacement", size).await?);
    }
    if let Some(uri) = effects.multiply.as_ref().and_then(|m| m.texture_uri.as_deref()) {
        textures.multiply = Some(load_texture(ctx, uri, dir, "multiply", size).await?);
    }
    if let Some(s) = &effects.screen {
        textures.screen = Some(load_texture(ctx, &s.texture_uri, dir, "screen", size).await?);
    }
    Ok(textures)
}

/// Key the job's source video and return the transparent WebM's URI.
///
/// Every output of one pass shares a key stem, so the GIF and frame
/// archive sit next to the WebM with a different extension.
pub async fn handle(ctx: &WorkerContext, job: &Job) -> WorkerResult<String> {
    let logger = JobLogger::new(job.id, job.job_type, "keying");
    let settings = job.keying_settings.clone().unwrap_or_default();
    validated(&settings)?;
    let source = job
        .keying_source()
        .ok_or_else(|| WorkerError::invalid_input("Job has no video to key."))?;

    let scratch = job_scratch_dir(&ctx.config.work_dir, &format!("{}-key", job.id))?;
    let dir = scratch.path();
    let runner = ctx.runner.as_ref();

    logger.log_start(&format!("keying {}", source));
    let input = dir.join(input_file_name("source", source, "mp4"));
    ctx.fetch_input(source, &input).await?;

    let info = runner.probe(&input).await?;
    if !(info.fps > 0.0) {
        return Err(MediaError::invalid_video(format!("{} reports no frame rate", source)).into());
    }
    let decoded = mforge_media::decode_frames(runner, &input, &info, &dir.join("decoded")).await?;
    logger.log_progress(&format!("decoded {} frames at {} fps", decoded.count, decoded.fps));

    let mut frames = {
        let (src, key_settings, out) = (decoded.clone(), settings.clone(), dir.join("keyed"));
        run_blocking("keying", move || key_frame_set(&src, &key_settings, &out)).await?
    };

    if let Some(effects) = settings.effects.clone().filter(|_| settings.has_effects()) {
        let size = image::image_dimensions(frames.path(0)).map_err(MediaError::from)?;
        let textures = load_textures(ctx, &effects, dir, size).await?;
        let pipeline = StickerPipeline::new(effects, textures)?;
        let (src, out) = (frames.clone(), dir.join("sticker"));
        frames = run_blocking("sticker", move || pipeline.apply_frame_set(&src, &out)).await?;
        logger.log_progress("applied sticker effects");
    }

    if let Some(target) = settings.posterize_fps.filter(|t| *t < frames.fps) {
        let (src, out) = (frames.clone(), dir.join("posterized"));
        frames = run_blocking("posterize", move || posterize_frames(&src, target, &out)).await?;
        logger.log_progress(&format!("posterized to {} frames at {} fps", frames.count, frames.fps));
    }

    let output = dir.join("keyed.webm");
    encode_alpha_video(runner, &frames, &output).await?;
    ensure_min_size(&output, ctx.config.min_output_bytes).await?;

    let stem = keyed_output_stem(job.id.as_i64());
    let uri = ctx.blobs.put_file(&output, &format!("{}.webm", stem)).await?;

    if settings.exports.gif {
        let gif = dir.join("keyed.gif");
        export_gif(runner, &frames, dir, &gif).await?;
        let gif_uri = ctx.blobs.put_file(&gif, &format!("{}.gif", stem)).await?;
        logger.log_progress(&format!("GIF export {}", gif_uri));
    }
    if settings.exports.frame_archive {
        let archive = dir.join("frames.tar.gz");
        let (src, prefix, out) = (frames.clone(), format!("job_{}", job.id), archive.clone());
        let count = run_blocking("frame archive", move || write_frame_archive(&src, &prefix, &out)).await?;
        let archive_uri = ctx.blobs.put_file(&archive, &format!("{}.tar.gz", stem)).await?;
        logger.log_progress(&format!("archived {} frames to {}", count, archive_uri));
    }

    logger.log_completion(&uri);
    Ok(uri)
}

/// Key the frame of `video_ref` at `time_secs` and store it as a PNG.
///
/// Lets settings be tuned before a full keying job is queued.
pub async fn preview(
    ctx: &WorkerContext,
    video_ref: &str,
    time_secs: f64,
    settings: &KeyingSettings,
) -> WorkerResult<String> {
    validated(settings)?;
    let scratch = job_scratch_dir(&ctx.config.work_dir, "preview")?;
    let input = scratch.path().join(input_file_name("source", video_ref, "mp4"));
    ctx.fetch_input(video_ref, &input).await?;

    // Probing only picks the decoder; a failed probe falls back to the default one.
    let info = ctx.runner.probe(&input).await.ok();
    let output = scratch.path().join("preview.png");
    preview_key(
        ctx.runner.as_ref(),
        &input,
        info.as_ref(),
        time_secs,
        settings,
        &output,
    )
    .await?;

    Ok(ctx.blobs.put_file(&output, &keying_preview_key()).await?)
}
