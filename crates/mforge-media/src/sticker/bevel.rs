//! Surface relief and alpha-edge bevel.

use image::{GrayImage, Luma, RgbaImage};

use mforge_models::{EdgeBevelSettings, SurfaceBevelSettings};

use super::blend::overlay_relief;
use crate::mask::gaussian_blur;

fn clamped(v: i64, len: u32) -> u32 {
    v.clamp(0, len as i64 - 1) as u32
}

/// Central-difference gradient of a scalar field sampled by `at`.
fn gradient(w: u32, h: u32, x: u32, y: u32, at: impl Fn(u32, u32) -> f32) -> (f32, f32) {
    let (xi, yi) = (x as i64, y as i64);
    let gx = (at(clamped(xi + 1, w), y) - at(clamped(xi - 1, w), y)) * 0.5;
    let gy = (at(x, clamped(yi + 1, h)) - at(x, clamped(yi - 1, h))) * 0.5;
    (gx, gy)
}

/// Mid-grey relief map from the frame's luminance gradients.
pub fn surface_relief(frame: &RgbaImage, depth: f32) -> GrayImage {
    let (w, h) = frame.dimensions();
    let lum = |x: u32, y: u32| {
        let p = frame.get_pixel(x, y);
        0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
    };

    GrayImage::from_fn(w, h, |x, y| {
        let (gx, gy) = gradient(w, h, x, y, lum);
        let v = 128.0 + depth * (gx + gy);
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Emboss the frame with its own luminance contours (Overlay blend).
pub fn surface_bevel(frame: &RgbaImage, settings: &SurfaceBevelSettings) -> RgbaImage {
    if frame.width() == 0 || frame.height() == 0 {
        return frame.clone();
    }
    let relief = surface_relief(frame, settings.depth);
    overlay_relief(frame, &relief, settings.opacity)
}

/// Highlight and shadow masks for the alpha edges facing toward and away
/// from the light.
pub fn edge_masks(frame: &RgbaImage, settings: &EdgeBevelSettings) -> (GrayImage, GrayImage) {
    let (w, h) = frame.dimensions();
    let angle = settings.light_angle_deg.to_radians();
    // Screen space: y grows downward.
    let light = (angle.cos(), -angle.sin());
    let alpha = |x: u32, y: u32| frame.get_pixel(x, y)[3] as f32 / 255.0;

    let mut highlight = GrayImage::new(w, h);
    let mut shadow = GrayImage::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let (gx, gy) = gradient(w, h, x, y, alpha);
            let magnitude = (gx * gx + gy * gy).sqrt();
            if magnitude <= f32::EPSILON {
                continue;
            }
            // Outward normal points from opaque toward transparent.
            let normal = (-gx / magnitude, -gy / magnitude);
            let facing = normal.0 * light.0 + normal.1 * light.1;
            let strength = magnitude * 2.0 * settings.intensity;
            let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;

            if facing > 0.0 {
                highlight.get_pixel_mut(x, y)[0] = to_u8(facing * strength);
            } else {
                shadow.get_pixel_mut(x, y)[0] = to_u8(-facing * strength);
            }
        }
    }

    if settings.blur > 0 {
        highlight = gaussian_blur(&highlight, settings.blur);
        shadow = gaussian_blur(&shadow, settings.blur);
    }
    (highlight, shadow)
}

/// Brighten light-facing alpha edges and darken the others. RGB only.
pub fn edge_bevel(frame: &RgbaImage, settings: &EdgeBevelSettings) -> RgbaImage {
    if frame.width() == 0 || frame.height() == 0 {
        return frame.clone();
    }
    let (highlight, shadow) = edge_masks(frame, settings);
    let mut out = frame.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let delta = highlight.get_pixel(x, y)[0] as i16 - shadow.get_pixel(x, y)[0] as i16;
        if delta == 0 {
            continue;
        }
        for c in 0..3 {
            px[c] = (px[c] as i16 + delta).clamp(0, 255) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Opaque disc-like square in the middle of a transparent canvas.
    fn sticker() -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, y| {
            if (4..12).contains(&x) && (4..12).contains(&y) {
                Rgba([120, 120, 120, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    fn alpha(img: &RgbaImage) -> Vec<u8> {
        img.pixels().map(|p| p[3]).collect()
    }

    #[test]
    fn test_flat_frame_relief_is_mid_grey() {
        let flat = RgbaImage::from_pixel(6, 6, Rgba([90, 90, 90, 255]));
        let relief = surface_relief(&flat, 3.0);
        assert!(relief.pixels().all(|p| p[0] == 128));
        assert_eq!(surface_bevel(&flat, &SurfaceBevelSettings::default()), flat);
    }

    #[test]
    fn test_surface_bevel_keeps_alpha() {
        let frame = RgbaImage::from_fn(10, 10, |x, y| {
            Rgba([(x * 25) as u8, (y * 20) as u8, 60, ((x + y) * 12) as u8])
        });
        let out = surface_bevel(
            &frame,
            &SurfaceBevelSettings {
                depth: 4.0,
                opacity: 1.0,
            },
        );
        assert_eq!(alpha(&out), alpha(&frame));
        assert_ne!(out, frame);
    }

    #[test]
    fn test_light_from_upper_left() {
        let frame = sticker();
        let settings = EdgeBevelSettings {
            light_angle_deg: 135.0,
            intensity: 1.0,
            blur: 0,
        };
        let (highlight, shadow) = edge_masks(&frame, &settings);

        // Top-left edge faces the light, bottom-right edge faces away.
        assert!(highlight.get_pixel(4, 4)[0] > 0);
        assert_eq!(shadow.get_pixel(4, 4)[0], 0);
        assert!(shadow.get_pixel(11, 11)[0] > 0);
        assert_eq!(highlight.get_pixel(11, 11)[0], 0);
        // Interior has no edge.
        assert_eq!(highlight.get_pixel(8, 8)[0], 0);
        assert_eq!(shadow.get_pixel(8, 8)[0], 0);
    }

    #[test]
    fn test_edge_bevel_changes_rgb_only() {
        let frame = sticker();
        let out = edge_bevel(&frame, &EdgeBevelSettings::default());
        assert_eq!(alpha(&out), alpha(&frame));
        assert!(out.get_pixel(4, 4)[0] > frame.get_pixel(4, 4)[0]);
        assert!(out.get_pixel(11, 11)[0] < frame.get_pixel(11, 11)[0]);
    }
}
