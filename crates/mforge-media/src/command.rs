//! FFmpeg command builder and supervised step runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::metrics;
use crate::probe::{probe_video, VideoInfo};

/// Longest stderr tail kept in outcomes and error messages.
const STDERR_TAIL_CHARS: usize = 2000;

#[derive(Debug, Clone)]
struct FfmpegInput {
    args: Vec<String>,
    path: PathBuf,
}

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Inputs in `-i` order, each with the arguments that precede it
    inputs: Vec<FfmpegInput>,
    /// Output file path
    output: PathBuf,
    /// Output arguments (after the last -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command with a single input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![FfmpegInput {
                args: Vec::new(),
                path: input.as_ref().to_path_buf(),
            }],
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Append another input. Subsequent `input_arg` calls apply to it.
    pub fn add_input(mut self, input: impl AsRef<Path>) -> Self {
        self.inputs.push(FfmpegInput {
            args: Vec::new(),
            path: input.as_ref().to_path_buf(),
        });
        self
    }

    /// Add an argument before the most recently added `-i`.
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        if let Some(input) = self.inputs.last_mut() {
            input.args.push(arg.into());
        }
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(input) = self.inputs.last_mut() {
            input.args.extend(args.into_iter().map(Into::into));
        }
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set input frame rate (image sequences).
    pub fn framerate(self, fps: f64) -> Self {
        self.input_arg("-framerate").input_arg(format_fps(fps))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set filter complex.
    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set pixel format.
    pub fn pixel_format(self, pix_fmt: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(pix_fmt)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn input_paths(&self) -> impl Iterator<Item = &Path> {
        self.inputs.iter().map(|i| i.path.as_path())
    }

    /// Whether `arg` appears anywhere in the built argument list.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.build_args().iter().any(|a| a == arg)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.extend(input.args.iter().cloned());
            args.push("-i".to_string());
            args.push(input.path.to_string_lossy().to_string());
        }

        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Render a frame rate without a trailing `.0` for whole numbers.
pub fn format_fps(fps: f64) -> String {
    if fps.fract() == 0.0 {
        format!("{}", fps as i64)
    } else {
        format!("{:.3}", fps)
    }
}

/// Typed result of one supervised external step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    /// Killed after exceeding its timeout
    TimedOut { after_secs: u64 },
    /// Exited non-zero
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success)
    }

    /// Convert a non-success outcome into an error labelled with `step`.
    pub fn into_result(self, step: &str) -> MediaResult<()> {
        match self {
            StepOutcome::Success => Ok(()),
            StepOutcome::TimedOut { after_secs } => Err(MediaError::Timeout(after_secs)),
            StepOutcome::Failed { exit_code, stderr } => Err(MediaError::ffmpeg_failed(
                format!("{} exited with status {:?}: {}", step, exit_code, stderr.trim()),
                Some(stderr),
                exit_code,
            )),
        }
    }
}

/// Runs FFmpeg steps. Implemented by [`FfmpegRunner`]; tests substitute fakes.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run `cmd`, killing it if it outlives `timeout`.
    ///
    /// Errors only when the process cannot be started; exit status and
    /// timeouts are reported through [`StepOutcome`].
    async fn run_step(
        &self,
        cmd: &FfmpegCommand,
        timeout: Option<Duration>,
    ) -> MediaResult<StepOutcome>;

    /// Run `cmd` and turn any non-success outcome into an error.
    async fn run(&self, cmd: &FfmpegCommand, step: &str) -> MediaResult<()> {
        self.run_step(cmd, None).await?.into_result(step)
    }

    /// Stream metadata for `path`; ffprobe unless overridden.
    async fn probe(&self, path: &Path) -> MediaResult<VideoInfo> {
        probe_video(path).await
    }
}

/// Supervised FFmpeg process runner.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    /// Applied when a call passes no timeout
    default_timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fallback timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl StepRunner for FfmpegRunner {
    async fn run_step(
        &self,
        cmd: &FfmpegCommand,
        timeout: Option<Duration>,
    ) -> MediaResult<StepOutcome> {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let started = Instant::now();
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let timeout = timeout.or(self.default_timeout);
        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(
                        "FFmpeg timed out after {} seconds, killing process",
                        limit.as_secs()
                    );
                    let _ = child.kill().await;
                    stderr_task.abort();
                    metrics::record_ffmpeg_step("timeout", started.elapsed().as_secs_f64());
                    return Ok(StepOutcome::TimedOut {
                        after_secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait().await?,
        };

        let stderr = stderr_task.await.unwrap_or_default();
        let elapsed = started.elapsed().as_secs_f64();

        if status.success() {
            metrics::record_ffmpeg_step("success", elapsed);
            Ok(StepOutcome::Success)
        } else {
            metrics::record_ffmpeg_step("failed", elapsed);
            Ok(StepOutcome::Failed {
                exit_code: status.code(),
                stderr: stderr_tail(&String::from_utf8_lossy(&stderr)),
            })
        }
    }
}

fn stderr_tail(stderr: &str) -> String {
    let count = stderr.chars().count();
    if count <= STDERR_TAIL_CHARS {
        stderr.to_string()
    } else {
        stderr.chars().skip(count - STDERR_TAIL_CHARS).collect()
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
