//! Looping texture sequences for the sticker effects.

use std::path::Path;

use image::imageops::FilterType;
use image::RgbaImage;
use tracing::debug;

use crate::command::StepRunner;
use crate::error::{MediaError, MediaResult};
use crate::frames::{decode_frames, list_frames};

const STILL_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

/// Frames of an animated texture, indexed cyclically.
#[derive(Debug, Clone)]
pub struct TextureSequence {
    frames: Vec<RgbaImage>,
}

impl TextureSequence {
    /// Build from in-memory frames resized to `width` x `height`.
    pub fn from_frames(frames: Vec<RgbaImage>, width: u32, height: u32) -> MediaResult<Self> {
        if frames.is_empty() {
            return Err(MediaError::invalid_frame("texture has no frames"));
        }
        let frames = frames
            .into_iter()
            .map(|f| {
                if f.dimensions() == (width, height) {
                    f
                } else {
                    image::imageops::resize(&f, width, height, FilterType::Triangle)
                }
            })
            .collect();
        Ok(Self { frames })
    }

    /// Load a still image or decode a video texture, sized to the target frames.
    pub async fn load(
        runner: &dyn StepRunner,
        path: &Path,
        scratch: &Path,
        width: u32,
        height: u32,
    ) -> MediaResult<Self> {
        let is_still = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| STILL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));

        let frames = if is_still {
            vec![image::open(path)?.to_rgba8()]
        } else {
            let info = runner.probe(path).await?;
            let set = decode_frames(runner, path, &info, scratch).await?;
            let paths = list_frames(&set.dir)?;
            tokio::task::spawn_blocking(move || -> MediaResult<Vec<RgbaImage>> {
                paths
                    .iter()
                    .map(|p| Ok(image::open(p)?.to_rgba8()))
                    .collect()
            })
            .await
            .map_err(|e| MediaError::internal(format!("texture load task failed: {e}")))??
        };

        debug!(frames = frames.len(), "Loaded texture {}", path.display());
        Self::from_frames(frames, width, height)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Texture frame for output frame `index`; shorter textures loop.
    pub fn at(&self, index: usize) -> &RgbaImage {
        &self.frames[index % self.frames.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_cyclic_indexing() {
        let frames = (0..3)
            .map(|i| RgbaImage::from_pixel(2, 2, Rgba([i, 0, 0, 255])))
            .collect();
        let tex = TextureSequence::from_frames(frames, 2, 2).unwrap();
        assert_eq!(tex.len(), 3);
        assert_eq!(tex.at(4).get_pixel(0, 0)[0], 1);
        assert_eq!(tex.at(6).get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_resized_to_target() {
        let tex =
            TextureSequence::from_frames(vec![RgbaImage::new(4, 4)], 10, 6).unwrap();
        assert_eq!(tex.at(0).dimensions(), (10, 6));
    }

    #[test]
    fn test_empty_texture_rejected() {
        assert!(TextureSequence::from_frames(Vec::new(), 2, 2).is_err());
    }
}
