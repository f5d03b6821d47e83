//! Export variants derived from a finished frame set.

use std::fs::File;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder as TarBuilder;
use tracing::info;

use crate::command::{FfmpegCommand, StepRunner};
use crate::error::MediaResult;
use crate::frames::{frame_name, FrameSet};

/// First pass: build an optimised palette that reserves a transparent entry.
pub fn palette_command(frames: &FrameSet, palette: &Path) -> FfmpegCommand {
    FfmpegCommand::new(frames.pattern(), palette)
        .framerate(frames.fps)
        .input_args(["-start_number", "0"])
        .video_filter("palettegen=reserve_transparent=1")
}

/// Second pass: map the frames onto the palette.
pub fn gif_command(frames: &FrameSet, palette: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(frames.pattern(), output)
        .framerate(frames.fps)
        .input_args(["-start_number", "0"])
        .add_input(palette)
        .filter_complex("[0:v][1:v]paletteuse=alpha_threshold=128")
        .output_args(["-loop", "0"])
}

/// Palette-optimised animated GIF of `frames`.
pub async fn export_gif(
    runner: &dyn StepRunner,
    frames: &FrameSet,
    scratch: &Path,
    output: &Path,
) -> MediaResult<()> {
    let palette = scratch.join(format!("palette_{}.png", uuid::Uuid::new_v4()));
    runner.run(&palette_command(frames, &palette), "palettegen").await?;
    let result = runner
        .run(&gif_command(frames, &palette, output), "paletteuse")
        .await;
    let _ = tokio::fs::remove_file(&palette).await;
    result?;

    info!(frames = frames.count, "Exported GIF {}", output.display());
    Ok(())
}

/// Write every frame into a gzip-compressed tar under `prefix/`.
///
/// Blocking; returns the number of frames archived.
pub fn write_frame_archive(frames: &FrameSet, prefix: &str, output: &Path) -> MediaResult<usize> {
    let file = File::create(output)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = TarBuilder::new(encoder);

    for i in 0..frames.count {
        let mut frame = File::open(frames.path(i))?;
        tar.append_file(format!("{}/{}", prefix, frame_name(i)), &mut frame)?;
    }

    let encoder = tar.into_inner()?;
    encoder.finish()?;

    info!(frames = frames.count, "Archived frames to {}", output.display());
    Ok(frames.count)
}
