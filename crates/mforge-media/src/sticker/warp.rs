//! Luminance-driven displacement warp.

use image::{Rgba, RgbaImage};

use crate::chroma_key::luma;

/// Offset in pixels for a texture luminance: centred at mid-grey.
#[inline]
pub fn offset_for(lum: u8, intensity: f32) -> f32 {
    (lum as f32 / 255.0 - 0.5) * intensity
}

/// Bilinear RGB sample with edge clamping.
fn sample_rgb(img: &RgbaImage, x: f32, y: f32) -> [f32; 3] {
    let (w, h) = img.dimensions();
    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as u32, y0 as u32);
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0f32; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        *slot = top * (1.0 - fy) + bottom * fy;
    }
    out
}

/// Resample the frame's colour through the offset field of `texture`.
///
/// Each pixel reads from `(x + d, y + d)` where `d` comes from the texture
/// luminance at that pixel. Alpha is copied through unchanged.
pub fn displace(frame: &RgbaImage, texture: &RgbaImage, intensity: f32) -> RgbaImage {
    if frame.width() == 0 || frame.height() == 0 || intensity == 0.0 {
        return frame.clone();
    }

    let (w, h) = frame.dimensions();
    RgbaImage::from_fn(w, h, |x, y| {
        let t = texture.get_pixel(x, y);
        let d = offset_for(luma(&image::Rgb([t[0], t[1], t[2]])), intensity);
        let rgb = sample_rgb(frame, x as f32 + d, y as f32 + d);
        Rgba([
            rgb[0].round() as u8,
            rgb[1].round() as u8,
            rgb[2].round() as u8,
            frame.get_pixel(x, y)[3],
        ])
    })
}
