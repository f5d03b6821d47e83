//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Frame count reported by the container, if any
    pub frame_count: Option<u64>,
    /// Video codec
    pub codec: String,
    /// Pixel format, e.g. `yuva420p`
    pub pix_fmt: Option<String>,
    /// File size in bytes
    pub size: u64,
    /// WebM alpha tag (`alpha_mode=1`) present on the stream
    pub alpha_tagged: bool,
}

impl VideoInfo {
    /// Whether decoding must go through libvpx to keep the alpha plane.
    ///
    /// The native VP9 decoder drops the side-channel alpha of WebM files.
    pub fn needs_libvpx_decoder(&self) -> bool {
        self.codec == "vp9" && self.has_alpha()
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha_tagged
            || self
                .pix_fmt
                .as_deref()
                .is_some_and(|p| p.starts_with("yuva") || p.contains("rgba") || p.contains("argb"))
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    pix_fmt: Option<String>,
    #[serde(default)]
    tags: std::collections::HashMap<String, String>,
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::invalid_video("No video stream found"))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    let alpha_tagged = video_stream
        .tags
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("alpha_mode") && v.trim() == "1");

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        frame_count: video_stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.parse().ok()),
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        pix_fmt: video_stream.pix_fmt.clone(),
        size,
        alpha_tagged,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
///
/// Zero rates (`0/0`, reported for some image streams) yield `None`.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_webm_with_alpha() {
        let json = br#"{
            "format": {"duration": "5.005", "size": "812345"},
            "streams": [
                {"codec_type": "audio", "codec_name": "opus"},
                {
                    "codec_type": "video",
                    "codec_name": "vp9",
                    "width": 720,
                    "height": 720,
                    "r_frame_rate": "30/1",
                    "avg_frame_rate": "0/0",
                    "pix_fmt": "yuv420p",
                    "tags": {"ALPHA_MODE": "1", "ENCODER": "Lavc libvpx-vp9"}
                }
            ]
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.width, 720);
        assert!((info.fps - 30.0).abs() < 0.01);
        assert!(info.has_alpha());
        assert!(info.needs_libvpx_decoder());
        assert_eq!(info.frame_count, None);
    }

    #[test]
    fn test_parse_mp4_without_alpha() {
        let json = br#"{
            "format": {"duration": "10.0", "size": "2048"},
            "streams": [{
                "codec_type": "video",
                "codec_name": "h264",
                "width": 1080,
                "height": 1920,
                "avg_frame_rate": "24/1",
                "nb_frames": "240",
                "pix_fmt": "yuv420p"
            }]
        }"#;

        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.frame_count, Some(240));
        assert!(!info.has_alpha());
        assert!(!info.needs_libvpx_decoder());
    }

    #[test]
    fn test_no_video_stream() {
        let json = br#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(MediaError::InvalidVideo(_))
        ));
    }
}
