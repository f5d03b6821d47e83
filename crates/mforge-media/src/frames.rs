//! Frame-sequence decode, encode and time posterization.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::command::{FfmpegCommand, StepRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::VideoInfo;

/// printf-style pattern for frame files.
pub const FRAME_PATTERN: &str = "frame_%05d.png";

/// File name of frame `index`.
pub fn frame_name(index: usize) -> String {
    format!("frame_{:05}.png", index)
}

/// An ordered, contiguously numbered PNG sequence on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSet {
    pub dir: PathBuf,
    pub fps: f64,
    pub count: usize,
}

impl FrameSet {
    pub fn path(&self, index: usize) -> PathBuf {
        self.dir.join(frame_name(index))
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        (0..self.count).map(|i| self.path(i)).collect()
    }

    pub fn pattern(&self) -> PathBuf {
        self.dir.join(FRAME_PATTERN)
    }

    /// Same frames rewritten into another directory.
    pub fn with_dir(&self, dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fps: self.fps,
            count: self.count,
        }
    }
}

/// Sorted frame files in `dir`.
pub fn list_frames(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut frames: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("frame_") && n.ends_with(".png"))
        })
        .collect();
    frames.sort();
    Ok(frames)
}

/// Decode `src` into `frame_00000.png`, `frame_00001.png`, ... under `dir`.
///
/// VP9 sources carrying alpha are decoded with libvpx so the alpha plane
/// survives.
pub async fn decode_frames(
    runner: &dyn StepRunner,
    src: &Path,
    info: &VideoInfo,
    dir: &Path,
) -> MediaResult<FrameSet> {
    tokio::fs::create_dir_all(dir).await?;

    let cmd = decode_command(src, info, dir);

    runner.run(&cmd, "decode").await?;

    let count = list_frames(dir)?.len();
    if count == 0 {
        return Err(MediaError::invalid_video(format!(
            "no frames decoded from {}",
            src.display()
        )));
    }

    debug!(frames = count, fps = info.fps, "Decoded {}", src.display());
    Ok(FrameSet {
        dir: dir.to_path_buf(),
        fps: info.fps,
        count,
    })
}

pub fn decode_command(src: &Path, info: &VideoInfo, dir: &Path) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(src, dir.join(FRAME_PATTERN));
    if info.needs_libvpx_decoder() {
        cmd = cmd.input_arg("-c:v").input_arg("libvpx-vp9");
    }
    cmd.output_args(["-vsync", "0", "-start_number", "0"])
}

/// Encode a frame set into an alpha-carrying VP9 WebM.
pub async fn encode_alpha_video(
    runner: &dyn StepRunner,
    frames: &FrameSet,
    output: &Path,
) -> MediaResult<()> {
    let cmd = encode_command(frames, output);
    runner.run(&cmd, "encode").await?;
    info!(
        frames = frames.count,
        fps = frames.fps,
        "Encoded transparent video {}",
        output.display()
    );
    Ok(())
}

/// The alpha-preserving encode: yuva420p, constant quality, no alt-ref
/// frames, and an explicit alpha tag on the stream.
pub fn encode_command(frames: &FrameSet, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(frames.pattern(), output)
        .framerate(frames.fps)
        .input_args(["-start_number", "0"])
        .video_codec("libvpx-vp9")
        .pixel_format("yuva420p")
        .crf(10)
        .output_args(["-b:v", "0", "-auto-alt-ref", "0"])
        .output_args(["-metadata:s:v:0", "alpha_mode=1"])
}

/// Which source frames a posterize pass keeps.
///
/// `step = max(1, floor(src_fps / target_fps))`; frames `0, step, 2*step, ...`.
pub fn posterize_plan(count: usize, src_fps: f64, target_fps: f64) -> Vec<usize> {
    let step = if target_fps > 0.0 {
        ((src_fps / target_fps).floor() as usize).max(1)
    } else {
        1
    };
    (0..count).step_by(step).collect()
}

/// Thin a frame set to `target_fps`, renumbering the kept frames from 0 into
/// `out_dir`.
pub fn posterize_frames(frames: &FrameSet, target_fps: f64, out_dir: &Path) -> MediaResult<FrameSet> {
    std::fs::create_dir_all(out_dir)?;
    let keep = posterize_plan(frames.count, frames.fps, target_fps);

    for (new_index, old_index) in keep.iter().enumerate() {
        std::fs::rename(frames.path(*old_index), out_dir.join(frame_name(new_index)))?;
    }

    info!(
        from = frames.count,
        to = keep.len(),
        src_fps = frames.fps,
        target_fps,
        "Posterized frame sequence"
    );
    Ok(FrameSet {
        dir: out_dir.to_path_buf(),
        fps: target_fps,
        count: keep.len(),
    })
}

/// Decode the single frame at `time_secs` into `output` (PNG).
pub async fn extract_frame(
    runner: &dyn StepRunner,
    src: &Path,
    info: Option<&VideoInfo>,
    time_secs: f64,
    output: &Path,
) -> MediaResult<()> {
    let mut cmd = FfmpegCommand::new(src, output);
    if info.is_some_and(VideoInfo::needs_libvpx_decoder) {
        cmd = cmd.input_arg("-c:v").input_arg("libvpx-vp9");
    }
    let cmd = cmd.seek(time_secs.max(0.0)).single_frame();

    runner.run(&cmd, "extract frame").await?;
    if !output.exists() {
        return Err(MediaError::invalid_video(format!(
            "no frame at {:.3}s in {}",
            time_secs,
            src.display()
        )));
    }
    Ok(())
}
