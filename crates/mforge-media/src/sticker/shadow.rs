//! Drop shadow on an expanded canvas.

use image::{GrayImage, Luma, Rgba, RgbaImage};

use mforge_models::DropShadowSettings;

use super::blend::mul_div255;
use crate::mask::gaussian_blur;

/// Margin added on every side of the canvas, rounded up to an even number
/// so 4:2:0 encodes keep even dimensions.
pub fn shadow_margin(settings: &DropShadowSettings) -> u32 {
    let reach = settings.offset_x.unsigned_abs().max(settings.offset_y.unsigned_abs())
        + settings.blur;
    reach + reach % 2
}

/// Straight-alpha "over" of `src` onto `dst`.
fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let sa = src[3] as u16;
    if sa == 255 {
        return src;
    }
    if sa == 0 {
        return dst;
    }
    let da = mul_div255(dst[3] as u16, 255 - sa) as u16;
    let out_a = sa + da;
    if out_a == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let premul = src[c] as u32 * sa as u32 + dst[c] as u32 * da as u32;
        out[c] = ((premul + out_a as u32 / 2) / out_a as u32).min(255) as u8;
    }
    out[3] = out_a.min(255) as u8;
    Rgba(out)
}

/// Composite a blurred, offset black shadow of `frame`'s alpha underneath it.
///
/// The result is `2 * margin` larger in each dimension with the subject
/// centred, so every frame of a sequence gets the same canvas.
pub fn drop_shadow(frame: &RgbaImage, settings: &DropShadowSettings) -> RgbaImage {
    let margin = shadow_margin(settings);
    let (w, h) = frame.dimensions();
    let (cw, ch) = (w + 2 * margin, h + 2 * margin);
    let opacity = settings.opacity.clamp(0.0, 1.0);

    let mut shadow_alpha = GrayImage::new(cw, ch);
    for (x, y, px) in frame.enumerate_pixels() {
        let sx = (x + margin) as i64 + settings.offset_x as i64;
        let sy = (y + margin) as i64 + settings.offset_y as i64;
        if sx >= 0 && sy >= 0 && (sx as u32) < cw && (sy as u32) < ch {
            let a = (px[3] as f32 * opacity).round() as u8;
            shadow_alpha.put_pixel(sx as u32, sy as u32, Luma([a]));
        }
    }
    if settings.blur > 0 {
        shadow_alpha = gaussian_blur(&shadow_alpha, settings.blur);
    }

    RgbaImage::from_fn(cw, ch, |x, y| {
        let shadow = Rgba([0, 0, 0, shadow_alpha.get_pixel(x, y)[0]]);
        let inside = x >= margin && y >= margin && x < margin + w && y < margin + h;
        if inside {
            over(shadow, *frame.get_pixel(x - margin, y - margin))
        } else {
            shadow
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sticker() -> RgbaImage {
        RgbaImage::from_fn(10, 10, |x, y| {
            if (3..7).contains(&x) && (3..7).contains(&y) {
                Rgba([250, 40, 40, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn test_margin_is_even() {
        let s = DropShadowSettings {
            offset_x: 3,
            offset_y: -8,
            blur: 5,
            opacity: 0.5,
        };
        assert_eq!(shadow_margin(&s), 14);
        let s = DropShadowSettings { blur: 4, ..s };
        assert_eq!(shadow_margin(&s), 12);
    }

    #[test]
    fn test_opaque_subject_is_preserved() {
        let frame = sticker();
        let settings = DropShadowSettings {
            offset_x: 2,
            offset_y: 2,
            blur: 0,
            opacity: 0.5,
        };
        let out = drop_shadow(&frame, &settings);
        let m = shadow_margin(&settings);
        assert_eq!(out.dimensions(), (10 + 2 * m, 10 + 2 * m));

        for (x, y, px) in frame.enumerate_pixels() {
            if px[3] == 255 {
                assert_eq!(out.get_pixel(x + m, y + m), px);
            }
        }
    }

    #[test]
    fn test_shadow_appears_at_offset() {
        let frame = sticker();
        let settings = DropShadowSettings {
            offset_x: 3,
            offset_y: 3,
            blur: 0,
            opacity: 0.5,
        };
        let out = drop_shadow(&frame, &settings);
        let m = shadow_margin(&settings);

        // Below-right of the subject: pure shadow.
        let px = out.get_pixel(m + 8, m + 8);
        assert_eq!(px.0, [0, 0, 0, 128]);
        // Far corner: nothing.
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_over_blends_partial_alpha() {
        let dst = Rgba([0, 0, 0, 255]);
        let src = Rgba([255, 255, 255, 128]);
        let out = over(dst, src);
        assert_eq!(out[3], 255);
        assert!((out[0] as i16 - 128).abs() <= 1);
    }
}
