//! Two-strategy video concatenation.
//!
//! The stream-copy path is tried first; a non-zero exit, timeout or undersized
//! output falls back to decoding every input and re-encoding with x264.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::command::{FfmpegCommand, StepOutcome, StepRunner};
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{ensure_min_size, file_size};
use crate::metrics;

/// Limits and timeouts for stitching.
#[derive(Debug, Clone)]
pub struct StitchConfig {
    /// Inputs above this size are rejected before either path runs
    pub max_input_bytes: u64,
    pub fast_timeout: Duration,
    pub fallback_timeout: Duration,
    /// Outputs below this size are treated as failures
    pub min_output_bytes: u64,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 100 * 1024 * 1024,
            fast_timeout: Duration::from_secs(60),
            fallback_timeout: Duration::from_secs(120),
            min_output_bytes: 1024,
        }
    }
}

/// Which path produced the stitched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StitchStrategy {
    StreamCopy,
    ReEncode,
}

impl StitchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StitchStrategy::StreamCopy => "stream_copy",
            StitchStrategy::ReEncode => "re_encode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchReport {
    pub strategy: StitchStrategy,
    pub output_bytes: u64,
}

/// Quote a path for a concat demuxer list.
fn concat_entry(path: &Path) -> String {
    let escaped = path.to_string_lossy().replace('\'', r"'\''");
    format!("file '{}'\n", escaped)
}

pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs.iter().map(|p| concat_entry(p)).collect()
}

pub fn stream_copy_command(list_file: &Path, output: &Path) -> FfmpegCommand {
    FfmpegCommand::new(list_file, output)
        .input_args(["-f", "concat", "-safe", "0"])
        .output_args(["-c", "copy", "-avoid_negative_ts", "make_zero"])
}

pub fn re_encode_command(inputs: &[PathBuf], output: &Path) -> FfmpegCommand {
    let mut cmd = FfmpegCommand::new(&inputs[0], output);
    for input in &inputs[1..] {
        cmd = cmd.add_input(input);
    }

    let streams: String = (0..inputs.len()).map(|i| format!("[{}:v]", i)).collect();
    cmd.filter_complex(format!("{}concat=n={}:v=1[v]", streams, inputs.len()))
        .output_args(["-map", "[v]"])
        .video_codec("libx264")
        .preset("ultrafast")
        .crf(23)
        .pixel_format("yuv420p")
        .output_args(["-movflags", "+faststart"])
}

/// Concatenate `inputs` (at least two) into `output`.
pub async fn stitch_videos(
    runner: &dyn StepRunner,
    inputs: &[PathBuf],
    output: &Path,
    scratch: &Path,
    config: &StitchConfig,
) -> MediaResult<StitchReport> {
    if inputs.len() < 2 {
        return Err(MediaError::invalid_video(format!(
            "stitching needs at least two inputs, got {}",
            inputs.len()
        )));
    }
    for input in inputs {
        let size = file_size(input).await?;
        if size > config.max_input_bytes {
            return Err(MediaError::resource_limit(format!(
                "{} is {} bytes, limit is {}",
                input.display(),
                size,
                config.max_input_bytes
            )));
        }
    }

    tokio::fs::create_dir_all(scratch).await?;
    let list_file = scratch.join(format!("concat_{}.txt", uuid::Uuid::new_v4()));
    tokio::fs::write(&list_file, concat_list(inputs)).await?;

    let fast = runner
        .run_step(&stream_copy_command(&list_file, output), Some(config.fast_timeout))
        .await;
    let _ = tokio::fs::remove_file(&list_file).await;

    match fast {
        Ok(StepOutcome::Success) => match ensure_min_size(output, config.min_output_bytes).await {
            Ok(output_bytes) => {
                metrics::record_stitch_strategy(StitchStrategy::StreamCopy.as_str());
                info!(output_bytes, "Stitched {} inputs by stream copy", inputs.len());
                return Ok(StitchReport {
                    strategy: StitchStrategy::StreamCopy,
                    output_bytes,
                });
            }
            Err(e) => warn!("Stream-copy output rejected, re-encoding: {}", e),
        },
        Ok(StepOutcome::TimedOut { after_secs }) => {
            warn!("Stream-copy stitch timed out after {}s, re-encoding", after_secs)
        }
        Ok(StepOutcome::Failed { exit_code, stderr }) => warn!(
            "Stream-copy stitch exited with {:?}, re-encoding: {}",
            exit_code,
            stderr.trim()
        ),
        Err(e) => warn!("Stream-copy stitch could not run, re-encoding: {}", e),
    }

    runner
        .run_step(&re_encode_command(inputs, output), Some(config.fallback_timeout))
        .await?
        .into_result("stitch re-encode")?;

    let output_bytes = ensure_min_size(output, config.min_output_bytes).await?;
    metrics::record_stitch_strategy(StitchStrategy::ReEncode.as_str());
    info!(output_bytes, "Stitched {} inputs by re-encoding", inputs.len());
    Ok(StitchReport {
        strategy: StitchStrategy::ReEncode,
        output_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted runner: pops one outcome per call and writes `bytes` to the
    /// output on success.
    struct ScriptedRunner {
        script: Mutex<Vec<(StepOutcome, usize)>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(mut script: Vec<(StepOutcome, usize)>) -> Self {
            script.reverse();
            Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StepRunner for ScriptedRunner {
        async fn run_step(
            &self,
            cmd: &FfmpegCommand,
            _timeout: Option<Duration>,
        ) -> MediaResult<StepOutcome> {
            self.calls.lock().unwrap().push(cmd.build_args());
            let (outcome, bytes) = self.script.lock().unwrap().pop().unwrap();
            if outcome.is_success() {
                std::fs::write(cmd.output_path(), vec![7u8; bytes]).unwrap();
            }
            Ok(outcome)
        }
    }

    fn inputs(dir: &TempDir, size: usize) -> Vec<PathBuf> {
        ["a.mp4", "b.mp4"]
            .iter()
            .map(|name| {
                let p = dir.path().join(name);
                std::fs::write(&p, vec![1u8; size]).unwrap();
                p
            })
            .collect()
    }

    fn failed() -> StepOutcome {
        StepOutcome::Failed {
            exit_code: Some(1),
            stderr: "Non-monotonous DTS".into(),
        }
    }

    #[tokio::test]
    async fn test_fast_path() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptedRunner::new(vec![(StepOutcome::Success, 4096)]);
        let out = dir.path().join("out.mp4");

        let report = stitch_videos(
            &runner,
            &inputs(&dir, 2000),
            &out,
            dir.path(),
            &StitchConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.strategy, StitchStrategy::StreamCopy);
        assert_eq!(report.output_bytes, 4096);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].join(" ").contains("-f concat -safe 0 -i"));
        assert!(calls[0].join(" ").contains("-c copy -avoid_negative_ts make_zero"));
    }

    #[tokio::test]
    async fn test_falls_back_when_copy_fails() {
        let dir = TempDir::new().unwrap();
        let runner =
            ScriptedRunner::new(vec![(failed(), 0), (StepOutcome::Success, 2048)]);
        let out = dir.path().join("out.mp4");

        let report = stitch_videos(
            &runner,
            &inputs(&dir, 2000),
            &out,
            dir.path(),
            &StitchConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.strategy, StitchStrategy::ReEncode);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        let fallback = calls[1].join(" ");
        assert!(fallback.contains("[0:v][1:v]concat=n=2:v=1[v]"));
        assert!(fallback.contains("-c:v libx264 -preset ultrafast -crf 23 -pix_fmt yuv420p"));
    }

    #[tokio::test]
    async fn test_falls_back_on_timeout_and_tiny_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.mp4");

        let runner = ScriptedRunner::new(vec![
            (StepOutcome::TimedOut { after_secs: 60 }, 0),
            (StepOutcome::Success, 1500),
        ]);
        let report = stitch_videos(&runner, &inputs(&dir, 10), &out, dir.path(), &StitchConfig::default())
            .await
            .unwrap();
        assert_eq!(report.strategy, StitchStrategy::ReEncode);

        let runner = ScriptedRunner::new(vec![
            (StepOutcome::Success, 12),
            (StepOutcome::Success, 1500),
        ]);
        let report = stitch_videos(&runner, &inputs(&dir, 10), &out, dir.path(), &StitchConfig::default())
            .await
            .unwrap();
        assert_eq!(report.strategy, StitchStrategy::ReEncode);
    }

    #[tokio::test]
    async fn test_both_paths_fail() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptedRunner::new(vec![
            (failed(), 0),
            (StepOutcome::TimedOut { after_secs: 120 }, 0),
        ]);
        let err = stitch_videos(
            &runner,
            &inputs(&dir, 10),
            &dir.path().join("out.mp4"),
            dir.path(),
            &StitchConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::Timeout(120)));
    }

    #[tokio::test]
    async fn test_oversized_input_rejected_before_running() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptedRunner::new(Vec::new());
        let config = StitchConfig {
            max_input_bytes: 100,
            ..StitchConfig::default()
        };

        let err = stitch_videos(
            &runner,
            &inputs(&dir, 101),
            &dir.path().join("out.mp4"),
            dir.path(),
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MediaError::ResourceLimit(_)));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_real_clips_concatenate() {
        use crate::command::FfmpegRunner;
        use crate::probe::probe_video;

        let dir = TempDir::new().unwrap();
        let runner = FfmpegRunner::new();
        let mut clips = Vec::new();
        for name in ["a.mp4", "b.mp4"] {
            let path = dir.path().join(name);
            let cmd = FfmpegCommand::new("testsrc=duration=5:size=320x240:rate=30", &path)
                .input_args(["-f", "lavfi"])
                .video_codec("libx264")
                .pixel_format("yuv420p");
            runner.run(&cmd, "generate").await.unwrap();
            clips.push(path);
        }

        let out = dir.path().join("out.mp4");
        let report = stitch_videos(&runner, &clips, &out, dir.path(), &StitchConfig::default())
            .await
            .unwrap();
        assert_eq!(report.strategy, StitchStrategy::StreamCopy);

        let info = probe_video(&out).await.unwrap();
        assert!((info.duration - 10.0).abs() < 0.5, "duration {}", info.duration);
    }

    #[test]
    fn test_concat_list_escapes_quotes() {
        let list = concat_list(&[PathBuf::from("/v/it's.mp4"), PathBuf::from("/v/b.mp4")]);
        assert_eq!(list, "file '/v/it'\\''s.mp4'\nfile '/v/b.mp4'\n");
    }
}
