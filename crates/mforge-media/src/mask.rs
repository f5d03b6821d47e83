//! Single-channel mask operations used by the chroma keyer.
//!
//! All operations work on 8-bit masks (`0` or `255` before feathering) and
//! follow the usual 8-bit HSV conventions: hue in `0..180`, saturation and
//! value in `0..=255`.

use image::{GrayImage, RgbImage};

/// Convert an 8-bit RGB pixel to 8-bit HSV (`H` in `0..180`).
pub fn rgb_to_hsv8(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let diff = v - min;

    let s = if v == 0.0 {
        0.0
    } else {
        (diff * 255.0 / v).round()
    };

    let h = if diff == 0.0 {
        0.0
    } else {
        let mut deg = if v == rf {
            60.0 * (gf - bf) / diff
        } else if v == gf {
            120.0 + 60.0 * (bf - rf) / diff
        } else {
            240.0 + 60.0 * (rf - gf) / diff
        };
        if deg < 0.0 {
            deg += 360.0;
        }
        let h = (deg / 2.0).round();
        if h >= 180.0 {
            0.0
        } else {
            h
        }
    };

    [h as u8, s as u8, v as u8]
}

/// Inclusive range test in HSV space: 255 where every channel lies within
/// `[lower, upper]`, 0 elsewhere.
pub fn in_range_hsv(frame: &RgbImage, lower: [i32; 3], upper: [i32; 3]) -> GrayImage {
    let (w, h) = frame.dimensions();
    let mut mask = GrayImage::new(w, h);
    for (src, dst) in frame.pixels().zip(mask.pixels_mut()) {
        let hsv = rgb_to_hsv8(src[0], src[1], src[2]);
        let inside = (0..3).all(|c| {
            let v = hsv[c] as i32;
            v >= lower[c] && v <= upper[c]
        });
        dst[0] = if inside { 255 } else { 0 };
    }
    mask
}

#[derive(Clone, Copy)]
enum Morph {
    Erode,
    Dilate,
}

impl Morph {
    fn pick(self, a: u8, b: u8) -> u8 {
        match self {
            Morph::Erode => a.min(b),
            Morph::Dilate => a.max(b),
        }
    }

    fn identity(self) -> u8 {
        match self {
            Morph::Erode => u8::MAX,
            Morph::Dilate => 0,
        }
    }
}

/// Window offsets for a `k`-wide box anchored at its centre (`k / 2`).
fn window(k: u32) -> (i64, i64) {
    let anchor = (k / 2) as i64;
    (-anchor, k as i64 - 1 - anchor)
}

/// k×k box morphology, separable into a row pass and a column pass.
/// Samples outside the frame are ignored.
fn morph(mask: &GrayImage, k: u32, op: Morph) -> GrayImage {
    if k <= 1 {
        return mask.clone();
    }
    let (w, h) = mask.dimensions();
    let (lo, hi) = window(k);
    let mut rows = GrayImage::new(w, h);

    for y in 0..h {
        for x in 0..w {
            let mut acc = op.identity();
            for dx in lo..=hi {
                let sx = x as i64 + dx;
                if sx >= 0 && sx < w as i64 {
                    acc = op.pick(acc, mask.get_pixel(sx as u32, y)[0]);
                }
            }
            rows.get_pixel_mut(x, y)[0] = acc;
        }
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = op.identity();
            for dy in lo..=hi {
                let sy = y as i64 + dy;
                if sy >= 0 && sy < h as i64 {
                    acc = op.pick(acc, rows.get_pixel(x, sy as u32)[0]);
                }
            }
            out.get_pixel_mut(x, y)[0] = acc;
        }
    }
    out
}

/// Erode with a k×k all-ones element.
pub fn erode(mask: &GrayImage, k: u32) -> GrayImage {
    morph(mask, k, Morph::Erode)
}

/// Dilate with a k×k all-ones element.
pub fn dilate(mask: &GrayImage, k: u32) -> GrayImage {
    morph(mask, k, Morph::Dilate)
}

/// Dilate `iterations` times; zero iterations returns the mask unchanged.
pub fn dilate_iterated(mask: &GrayImage, k: u32, iterations: u32) -> GrayImage {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = dilate(&out, k);
    }
    out
}

/// Signed erode: positive shrinks the mask, negative grows it.
pub fn erode_signed(mask: &GrayImage, amount: i32) -> GrayImage {
    match amount.signum() {
        1 => erode(mask, amount as u32),
        -1 => dilate(mask, amount.unsigned_abs()),
        _ => mask.clone(),
    }
}

/// Signed dilate: positive grows the mask, negative shrinks it.
pub fn dilate_signed(mask: &GrayImage, amount: i32) -> GrayImage {
    match amount.signum() {
        1 => dilate(mask, amount as u32),
        -1 => erode(mask, amount.unsigned_abs()),
        _ => mask.clone(),
    }
}

/// Erode then dilate with the signed amounts.
pub fn apply_morphology(mask: &GrayImage, erode_amount: i32, dilate_amount: i32) -> GrayImage {
    let eroded = erode_signed(mask, erode_amount);
    dilate_signed(&eroded, dilate_amount)
}

/// Bump an even kernel size to the next odd one.
pub fn odd_kernel(k: u32) -> u32 {
    if k % 2 == 0 {
        k + 1
    } else {
        k
    }
}

/// Normalised 1-D Gaussian weights for an odd kernel size with automatic sigma.
///
/// Sizes up to 7 use the fixed binomial tables; larger sizes use
/// `sigma = 0.3 * ((k - 1) * 0.5 - 1) + 0.8`.
pub fn gaussian_kernel(k: u32) -> Vec<f32> {
    match k {
        0 | 1 => vec![1.0],
        3 => vec![0.25, 0.5, 0.25],
        5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => vec![
            0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
        ],
        _ => {
            let sigma = 0.3 * ((k as f64 - 1.0) * 0.5 - 1.0) + 0.8;
            let radius = (k / 2) as i64;
            let denom = 2.0 * sigma * sigma;
            let raw: Vec<f64> = (-radius..=radius)
                .map(|i| (-(i * i) as f64 / denom).exp())
                .collect();
            let sum: f64 = raw.iter().sum();
            raw.into_iter().map(|w| (w / sum) as f32).collect()
        }
    }
}

/// Reflect-101 border index (`dcb|abcd|cba`).
pub fn reflect101(i: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut i = i.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as usize
}

/// Separable Gaussian blur of a mask; `k` is bumped to odd.
pub fn gaussian_blur(mask: &GrayImage, k: u32) -> GrayImage {
    let k = odd_kernel(k);
    if k <= 1 {
        return mask.clone();
    }
    let kernel = gaussian_kernel(k);
    let radius = (kernel.len() / 2) as i64;
    let (w, h) = mask.dimensions();
    let (wi, hi) = (w as i64, h as i64);

    let mut rows = vec![0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, kw) in kernel.iter().enumerate() {
                let sx = reflect101(x as i64 + ki as i64 - radius, wi);
                acc += kw * mask.get_pixel(sx as u32, y)[0] as f32;
            }
            rows[(y * w + x) as usize] = acc;
        }
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (ki, kw) in kernel.iter().enumerate() {
                let sy = reflect101(y as i64 + ki as i64 - radius, hi);
                acc += kw * rows[sy * w as usize + x as usize];
            }
            out.get_pixel_mut(x, y)[0] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Bitwise NOT of a mask.
pub fn invert(mask: &GrayImage) -> GrayImage {
    let mut out = mask.clone();
    for p in out.pixels_mut() {
        p[0] = 255 - p[0];
    }
    out
}
