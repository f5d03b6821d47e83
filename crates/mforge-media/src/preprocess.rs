//! Boomerang image preparation.
//!
//! Both endpoint images are shrunk and centred on a solid key colour so the
//! generated clips can be keyed afterwards.

use std::path::Path;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Share of the canvas the subject occupies.
pub const SUBJECT_SCALE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundColor {
    Green,
    Blue,
}

impl BackgroundColor {
    pub fn rgb(&self) -> Rgb<u8> {
        match self {
            Self::Green => Rgb([0, 255, 0]),
            Self::Blue => Rgb([0, 0, 255]),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }
}

impl FromStr for BackgroundColor {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "green" => Ok(Self::Green),
            "blue" => Ok(Self::Blue),
            other => Err(MediaError::invalid_frame(format!(
                "unsupported background color '{}'",
                other
            ))),
        }
    }
}

/// Resize `img` to 90% with Lanczos and centre it on a solid canvas of the
/// original size. Transparent areas take the canvas colour.
pub fn prepare_on_canvas(img: &DynamicImage, color: BackgroundColor) -> RgbImage {
    let (width, height) = (img.width(), img.height());
    let new_w = ((width as f32 * SUBJECT_SCALE) as u32).max(1);
    let new_h = ((height as f32 * SUBJECT_SCALE) as u32).max(1);

    let subject = imageops::resize(&img.to_rgba8(), new_w, new_h, FilterType::Lanczos3);
    let bg = color.rgb();
    let mut canvas = RgbImage::from_pixel(width, height, bg);

    let x0 = (width - new_w) / 2;
    let y0 = (height - new_h) / 2;
    for (x, y, px) in subject.enumerate_pixels() {
        let a = px[3] as u32;
        let dst = canvas.get_pixel_mut(x0 + x, y0 + y);
        for c in 0..3 {
            dst[c] = ((px[c] as u32 * a + bg[c] as u32 * (255 - a) + 127) / 255) as u8;
        }
    }
    canvas
}

/// Prepare the image at `src` and write an RGB PNG to `dst`.
///
/// An unsupported colour leaves the image untouched and returns `false`.
pub fn prepare_image_file(src: &Path, dst: &Path, background: &str) -> MediaResult<bool> {
    let color = match background.parse::<BackgroundColor>() {
        Ok(color) => color,
        Err(e) => {
            warn!("{}; using {} unchanged", e, src.display());
            if src != dst {
                std::fs::copy(src, dst)?;
            }
            return Ok(false);
        }
    };

    let img = image::open(src)?;
    prepare_on_canvas(&img, color).save_with_format(dst, image::ImageFormat::Png)?;
    debug!(background = color.as_str(), "Prepared {}", dst.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_parse_background() {
        assert_eq!("green".parse::<BackgroundColor>().unwrap(), BackgroundColor::Green);
        assert_eq!("Blue".parse::<BackgroundColor>().unwrap(), BackgroundColor::Blue);
        assert!("magenta".parse::<BackgroundColor>().is_err());
    }

    #[test]
    fn test_canvas_border_and_centre() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(100, 50, Rgba([200, 10, 10, 255])));
        let out = prepare_on_canvas(&img, BackgroundColor::Green);

        assert_eq!(out.dimensions(), (100, 50));
        assert_eq!(out.get_pixel(0, 0).0, [0, 255, 0]);
        assert_eq!(out.get_pixel(99, 49).0, [0, 255, 0]);
        let centre = out.get_pixel(50, 25).0;
        assert!(centre[0].abs_diff(200) <= 1 && centre[1].abs_diff(10) <= 1);
    }

    #[test]
    fn test_transparent_subject_takes_canvas_colour() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 0])));
        let out = prepare_on_canvas(&img, BackgroundColor::Blue);
        assert!(out.pixels().all(|p| p.0 == [0, 0, 255]));
    }

    #[test]
    fn test_prepare_file_writes_rgb_png() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        RgbaImage::from_pixel(40, 40, Rgba([9, 9, 9, 255])).save(&src).unwrap();
        let dst = dir.path().join("a_prepared.png");

        assert!(prepare_image_file(&src, &dst, "blue").unwrap());
        let out = image::open(&dst).unwrap();
        assert_eq!(out.color(), image::ColorType::Rgb8);
        assert_eq!(out.to_rgb8().get_pixel(0, 0).0, [0, 0, 255]);
    }

    #[test]
    fn test_unsupported_colour_copies_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let src = dir.path().join("a.png");
        RgbaImage::from_pixel(8, 8, Rgba([1, 2, 3, 255])).save(&src).unwrap();
        let dst = dir.path().join("b.png");

        assert!(!prepare_image_file(&src, &dst, "purple").unwrap());
        assert_eq!(std::fs::read(&src).unwrap(), std::fs::read(&dst).unwrap());
    }
}
