#![deny(unreachable_patterns)]
//! Media processing for MediaForge jobs.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and a timed step runner
//! - HSV chroma keying with morphology, feathering and spill suppression
//! - The sticker effect compositor
//! - Frame decode/encode, posterize, stitching and export variants
//! - A watchdog for hung encoder processes

pub mod chroma_key;
pub mod command;
pub mod error;
pub mod export;
pub mod frames;
pub mod fs_utils;
pub mod mask;
pub mod metrics;
pub mod preprocess;
pub mod probe;
pub mod sticker;
pub mod stitch;
pub mod watchdog;

pub use chroma_key::{key_frame, key_frame_set, key_mask, preview_key};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner, StepOutcome, StepRunner};
pub use error::{MediaError, MediaResult};
pub use export::{export_gif, write_frame_archive};
pub use frames::{
    decode_frames, encode_alpha_video, extract_frame, posterize_frames, FrameSet,
};
pub use fs_utils::{ensure_min_size, job_scratch_dir, move_file};
pub use preprocess::{prepare_image_file, prepare_on_canvas, BackgroundColor};
pub use probe::{probe_video, VideoInfo};
pub use sticker::{StickerPipeline, StickerTextures, TextureSequence};
pub use stitch::{stitch_videos, StitchConfig, StitchReport, StitchStrategy};
pub use watchdog::{ProcessWatchdog, WatchdogConfig, WatchdogReport, WatchdogScope};
