//! Sticker effect compositor.
//!
//! Turns keyed RGBA frames into a textured "sticker" look. Steps run in a
//! fixed order (displacement, multiply, screen, surface bevel, edge bevel,
//! drop shadow). Every step before the drop shadow rewrites colour only.

pub mod bevel;
pub mod blend;
pub mod pipeline;
pub mod shadow;
pub mod texture;
pub mod warp;

pub use pipeline::{restore_alpha, StickerPipeline, StickerTextures};
pub use texture::TextureSequence;
