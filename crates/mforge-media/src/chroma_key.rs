//! Chroma-key engine.
//!
//! [`key_frame`] is pure and stateless: one RGB frame in, one straight-alpha
//! RGBA frame out. The file-level helpers fan frames out over rayon.

use std::path::{Path, PathBuf};

use image::{GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use rayon::prelude::*;
use tracing::debug;

use mforge_models::KeyingSettings;

use crate::command::StepRunner;
use crate::error::MediaResult;
use crate::frames::{extract_frame, frame_name, FrameSet};
use crate::mask;
use crate::metrics;
use crate::probe::VideoInfo;

/// Kernel size of the spill-map dilation.
const SPILL_DILATE_KERNEL: u32 = 3;
/// Kernel size of the spill-map blur.
const SPILL_BLUR_KERNEL: u32 = 5;

/// 8-bit luma with BT.601 weights, rounded.
pub fn luma(p: &Rgb<u8>) -> u8 {
    (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32).round() as u8
}

/// The key-colour mask after morphology, before feathering.
pub fn key_mask(frame: &RgbImage, settings: &KeyingSettings) -> GrayImage {
    let raw = mask::in_range_hsv(frame, settings.lower_bound(), settings.upper_bound());
    mask::apply_morphology(&raw, settings.erode, settings.dilate)
}

/// Key one frame.
pub fn key_frame(frame: &RgbImage, settings: &KeyingSettings) -> RgbaImage {
    let matte = key_mask(frame, settings);

    let feathered = if settings.blur > 0 {
        mask::gaussian_blur(&matte, settings.blur as u32)
    } else {
        matte.clone()
    };
    let alpha = mask::invert(&feathered);

    let spill_iterations = settings.spill.max(0) as u32;
    let spill_map = mask::gaussian_blur(
        &mask::dilate_iterated(&matte, SPILL_DILATE_KERNEL, spill_iterations),
        SPILL_BLUR_KERNEL,
    );

    let (w, h) = frame.dimensions();
    RgbaImage::from_fn(w, h, |x, y| {
        let src = frame.get_pixel(x, y);
        let weight = spill_map.get_pixel(x, y)[0] as f32 / 255.0;
        let gray = luma(src) as f32;
        let despill = |c: u8| (c as f32 * (1.0 - weight) + gray * weight) as u8;
        Rgba([
            despill(src[0]),
            despill(src[1]),
            despill(src[2]),
            alpha.get_pixel(x, y)[0],
        ])
    })
}

/// Key every frame of `frames` into `out_dir`, keeping numbering.
pub fn key_frame_set(
    frames: &FrameSet,
    settings: &KeyingSettings,
    out_dir: &Path,
) -> MediaResult<FrameSet> {
    std::fs::create_dir_all(out_dir)?;

    (0..frames.count)
        .into_par_iter()
        .try_for_each(|i| -> MediaResult<()> {
            let frame = image::open(frames.path(i))?.to_rgb8();
            let keyed = key_frame(&frame, settings);
            keyed.save(out_dir.join(frame_name(i)))?;
            Ok(())
        })?;

    metrics::record_frames_keyed(frames.count as u64);
    debug!(frames = frames.count, "Keyed frame set into {}", out_dir.display());
    Ok(frames.with_dir(out_dir))
}

/// Key a single frame of `video` at `time_secs` into `output` (PNG).
///
/// Used to fine-tune settings before queueing a full keying job.
pub async fn preview_key(
    runner: &dyn StepRunner,
    video: &Path,
    info: Option<&VideoInfo>,
    time_secs: f64,
    settings: &KeyingSettings,
    output: &Path,
) -> MediaResult<PathBuf> {
    let still = output.with_extension("source.png");
    extract_frame(runner, video, info, time_secs, &still).await?;

    let settings = settings.clone();
    let still_path = still.clone();
    let out_path = output.to_path_buf();
    tokio::task::spawn_blocking(move || -> MediaResult<()> {
        let frame = image::open(&still_path)?.to_rgb8();
        key_frame(&frame, &settings).save(&out_path)?;
        Ok(())
    })
    .await
    .map_err(|e| crate::error::MediaError::internal(format!("preview task failed: {e}")))??;

    let _ = tokio::fs::remove_file(&still).await;
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
    const SUBJECT: Rgb<u8> = Rgb([200, 60, 40]);

    fn settings() -> KeyingSettings {
        KeyingSettings {
            erode: 0,
            dilate: 0,
            blur: 0,
            spill: 0,
            ..KeyingSettings::default()
        }
    }

    /// Subject square centred on a green field.
    fn green_screen(size: u32, subject_from: u32, subject_to: u32) -> RgbImage {
        RgbImage::from_fn(size, size, |x, y| {
            let inside = (subject_from..subject_to).contains(&x)
                && (subject_from..subject_to).contains(&y);
            if inside {
                SUBJECT
            } else {
                GREEN
            }
        })
    }

    #[test]
    fn test_no_key_colour_leaves_frame_opaque_and_unchanged() {
        let frame = RgbImage::from_fn(8, 8, |x, y| Rgb([(x * 30) as u8, 10, (y * 30) as u8]));
        let keyed = key_frame(&frame, &KeyingSettings::default());

        for (src, out) in frame.pixels().zip(keyed.pixels()) {
            assert_eq!(&out.0[..3], &src.0[..]);
            assert_eq!(out[3], 255);
        }
    }

    #[test]
    fn test_green_becomes_transparent() {
        let frame = green_screen(20, 6, 14);
        let keyed = key_frame(&frame, &settings());

        assert_eq!(keyed.get_pixel(0, 0)[3], 0);
        assert_eq!(keyed.get_pixel(6, 6)[3], 255);
        assert_eq!(&keyed.get_pixel(10, 10).0[..3], &SUBJECT.0[..]);
    }

    #[test]
    fn test_spill_desaturates_near_edge_only() {
        let frame = green_screen(20, 6, 14);
        let keyed = key_frame(
            &frame,
            &KeyingSettings {
                spill: 2,
                ..settings()
            },
        );

        let edge = keyed.get_pixel(6, 10);
        assert_eq!(edge[3], 255);
        assert_ne!(&edge.0[..3], &SUBJECT.0[..]);

        let centre = keyed.get_pixel(10, 10);
        assert_eq!(&centre.0[..3], &SUBJECT.0[..]);
    }

    #[test]
    fn test_blur_feathers_alpha() {
        let frame = green_screen(20, 6, 14);
        let keyed = key_frame(
            &frame,
            &KeyingSettings {
                blur: 4,
                ..settings()
            },
        );
        let edge_alpha = keyed.get_pixel(6, 10)[3];
        assert!(edge_alpha > 0 && edge_alpha < 255, "alpha {edge_alpha}");
    }

    #[test]
    fn test_negative_erode_grows_matte() {
        let frame = green_screen(16, 5, 11);
        let base = key_mask(&frame, &settings());
        let grown = key_mask(
            &frame,
            &KeyingSettings {
                erode: -3,
                ..settings()
            },
        );
        let on = |m: &GrayImage| m.pixels().filter(|p| p[0] == 255).count();
        assert!(on(&grown) >= on(&base));
        assert_eq!(
            grown,
            key_mask(
                &frame,
                &KeyingSettings {
                    dilate: 3,
                    ..settings()
                }
            )
        );
    }

    #[test]
    fn test_key_frame_set_writes_every_frame() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        for i in 0..3 {
            green_screen(8, 2, 6).save(src.join(frame_name(i))).unwrap();
        }
        let frames = FrameSet {
            dir: src,
            fps: 24.0,
            count: 3,
        };

        let keyed = key_frame_set(&frames, &settings(), &dir.path().join("keyed")).unwrap();
        assert_eq!(keyed.count, 3);
        assert_eq!(keyed.fps, 24.0);
        let first = image::open(keyed.path(0)).unwrap().to_rgba8();
        assert_eq!(first.get_pixel(0, 0)[3], 0);
    }
}
