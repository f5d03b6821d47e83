//! Texture blends restricted to visible pixels.
//!
//! Each blend rewrites RGB only; the alpha channel is copied through.

use image::{Rgba, RgbaImage};

/// `x * y / 255` with rounding.
#[inline]
pub(crate) fn mul_div255(x: u16, y: u16) -> u8 {
    (((x as u32) * (y as u32) + 127) / 255) as u8
}

#[inline]
fn lerp(base: u8, target: f32, opacity: f32) -> u8 {
    (base as f32 + (target - base as f32) * opacity)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Multiply `texture` onto the visible pixels of `frame`.
pub fn multiply(frame: &RgbaImage, texture: &RgbaImage, opacity: f32) -> RgbaImage {
    let opacity = opacity.clamp(0.0, 1.0);
    map_visible(frame, texture, |c, t| {
        lerp(c, mul_div255(c as u16, t as u16) as f32, opacity)
    })
}

/// Linear-dodge `texture` onto the visible pixels of `frame`, saturating at 255.
pub fn add(frame: &RgbaImage, texture: &RgbaImage, opacity: f32) -> RgbaImage {
    let opacity = opacity.clamp(0.0, 1.0);
    map_visible(frame, texture, |c, t| {
        (c as f32 + t as f32 * opacity).round().min(255.0) as u8
    })
}

/// Overlay of a normalised blend value onto a normalised base value.
#[inline]
pub fn overlay(base: f32, blend: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * blend
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - blend)
    }
}

/// Overlay a single-channel relief map onto `frame` at `opacity`.
pub fn overlay_relief(frame: &RgbaImage, relief: &image::GrayImage, opacity: f32) -> RgbaImage {
    let opacity = opacity.clamp(0.0, 1.0);
    let mut out = frame.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let r = relief.get_pixel(x, y)[0] as f32 / 255.0;
        for c in 0..3 {
            let base = px[c] as f32 / 255.0;
            px[c] = lerp(px[c], overlay(base, r) * 255.0, opacity);
        }
    }
    out
}

/// Apply `f(channel, texture_channel)` to RGB where alpha is non-zero.
fn map_visible(
    frame: &RgbaImage,
    texture: &RgbaImage,
    f: impl Fn(u8, u8) -> u8,
) -> RgbaImage {
    let mut out = frame.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        if px[3] == 0 {
            continue;
        }
        let t: &Rgba<u8> = texture.get_pixel(x, y);
        for c in 0..3 {
            px[c] = f(px[c], t[c]);
        }
    }
    out
}
