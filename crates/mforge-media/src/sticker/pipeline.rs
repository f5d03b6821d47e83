//! Per-frame sticker pipeline.

use std::borrow::Cow;
use std::path::Path;

use image::imageops::FilterType;
use image::RgbaImage;
use rayon::prelude::*;
use tracing::debug;

use mforge_models::EffectSettings;

use super::bevel::{edge_bevel, surface_bevel};
use super::blend::{add, multiply};
use super::shadow::drop_shadow;
use super::texture::TextureSequence;
use super::warp::displace;
use crate::error::{MediaError, MediaResult};
use crate::frames::{frame_name, FrameSet};

/// Textures the enabled effects sample from.
#[derive(Debug, Clone, Default)]
pub struct StickerTextures {
    pub displacement: Option<TextureSequence>,
    /// Falls back to the displacement texture when absent
    pub multiply: Option<TextureSequence>,
    pub screen: Option<TextureSequence>,
}

/// Applies the enabled effects, in fixed order, to keyed RGBA frames.
#[derive(Debug, Clone)]
pub struct StickerPipeline {
    settings: EffectSettings,
    textures: StickerTextures,
}

impl StickerPipeline {
    /// Fails when an enabled effect has no texture to sample.
    pub fn new(settings: EffectSettings, textures: StickerTextures) -> MediaResult<Self> {
        if settings.displacement.is_some() && textures.displacement.is_none() {
            return Err(MediaError::invalid_frame("displacement needs a texture"));
        }
        if settings.multiply.is_some()
            && textures.multiply.is_none()
            && textures.displacement.is_none()
        {
            return Err(MediaError::invalid_frame("multiply needs a texture"));
        }
        if settings.screen.is_some() && textures.screen.is_none() {
            return Err(MediaError::invalid_frame("screen needs a texture"));
        }
        Ok(Self { settings, textures })
    }

    pub fn settings(&self) -> &EffectSettings {
        &self.settings
    }

    /// Run every enabled step on frame `index`.
    ///
    /// Steps before the drop shadow only rewrite colour; their alpha is
    /// restored from the input afterwards. The drop shadow then composites
    /// onto an expanded canvas.
    pub fn apply(&self, index: usize, frame: &RgbaImage) -> RgbaImage {
        let dims = frame.dimensions();
        let mut out = frame.clone();

        if let (Some(step), Some(tex)) = (&self.settings.displacement, &self.textures.displacement)
        {
            out = displace(&out, &fit(tex.at(index), dims), step.intensity);
        }

        if let Some(step) = &self.settings.multiply {
            let tex = self
                .textures
                .multiply
                .as_ref()
                .or(self.textures.displacement.as_ref());
            if let Some(tex) = tex {
                out = multiply(&out, &fit(tex.at(index), dims), step.opacity);
            }
        }

        if let (Some(step), Some(tex)) = (&self.settings.screen, &self.textures.screen) {
            out = add(&out, &fit(tex.at(index), dims), step.opacity);
        }

        if let Some(step) = &self.settings.surface_bevel {
            out = surface_bevel(&out, step);
        }

        if let Some(step) = &self.settings.edge_bevel {
            out = edge_bevel(&out, step);
        }

        restore_alpha(&mut out, frame);

        match &self.settings.drop_shadow {
            Some(step) => drop_shadow(&out, step),
            None => out,
        }
    }

    /// Process a whole frame set into `out_dir`, keeping numbering.
    pub fn apply_frame_set(&self, frames: &FrameSet, out_dir: &Path) -> MediaResult<FrameSet> {
        std::fs::create_dir_all(out_dir)?;

        (0..frames.count)
            .into_par_iter()
            .try_for_each(|i| -> MediaResult<()> {
                let frame = image::open(frames.path(i))?.to_rgba8();
                self.apply(i, &frame).save(out_dir.join(frame_name(i)))?;
                Ok(())
            })?;

        debug!(frames = frames.count, "Applied sticker effects");
        Ok(frames.with_dir(out_dir))
    }
}

/// Borrow the texture when it already matches the frame size.
fn fit(texture: &RgbaImage, dims: (u32, u32)) -> Cow<'_, RgbaImage> {
    if texture.dimensions() == dims {
        Cow::Borrowed(texture)
    } else {
        Cow::Owned(image::imageops::resize(
            texture,
            dims.0,
            dims.1,
            FilterType::Triangle,
        ))
    }
}

/// Force alpha back to `reference` and zero the colour of fully
/// transparent pixels.
pub fn restore_alpha(frame: &mut RgbaImage, reference: &RgbaImage) {
    for (px, src) in frame.pixels_mut().zip(reference.pixels()) {
        px[3] = src[3];
        if px[3] == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
        }
    }
}
