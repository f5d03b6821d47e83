//! Chroma-key settings attached to keying-capable jobs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::effects::EffectSettings;

/// Parameters for the chroma-key engine plus the optional sticker pipeline.
///
/// Hue uses the 8-bit convention (0..180), saturation and value 0..255.
/// `erode`/`dilate` accept negative values, which perform the opposite
/// morphology operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct KeyingSettings {
    #[validate(range(min = 0, max = 180))]
    #[serde(default = "default_hue_center")]
    pub hue_center: i32,
    #[validate(range(min = 0, max = 90))]
    #[serde(default = "default_hue_tolerance")]
    pub hue_tolerance: i32,
    #[validate(range(min = 0, max = 255))]
    #[serde(default = "default_saturation_min")]
    pub saturation_min: i32,
    #[validate(range(min = 0, max = 255))]
    #[serde(default = "default_value_min")]
    pub value_min: i32,
    #[validate(range(min = -20, max = 20))]
    #[serde(default = "default_erode")]
    pub erode: i32,
    #[validate(range(min = -20, max = 20))]
    #[serde(default = "default_dilate")]
    pub dilate: i32,
    #[validate(range(min = 0, max = 51))]
    #[serde(default = "default_blur")]
    pub blur: i32,
    #[validate(range(min = 0, max = 10))]
    #[serde(default = "default_spill")]
    pub spill: i32,

    /// Sticker effects applied after keying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub effects: Option<EffectSettings>,

    /// Thin the keyed sequence to this frame rate before encoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1.0, max = 120.0))]
    pub posterize_fps: Option<f64>,

    /// Extra outputs produced from the same intermediate frames
    #[serde(default)]
    pub exports: ExportOptions,
}

fn default_hue_center() -> i32 {
    60
}
fn default_hue_tolerance() -> i32 {
    25
}
fn default_saturation_min() -> i32 {
    50
}
fn default_value_min() -> i32 {
    50
}
fn default_erode() -> i32 {
    2
}
fn default_dilate() -> i32 {
    1
}
fn default_blur() -> i32 {
    5
}
fn default_spill() -> i32 {
    2
}

impl Default for KeyingSettings {
    fn default() -> Self {
        Self {
            hue_center: default_hue_center(),
            hue_tolerance: default_hue_tolerance(),
            saturation_min: default_saturation_min(),
            value_min: default_value_min(),
            erode: default_erode(),
            dilate: default_dilate(),
            blur: default_blur(),
            spill: default_spill(),
            effects: None,
            posterize_fps: None,
            exports: ExportOptions::default(),
        }
    }
}

impl KeyingSettings {
    /// Inclusive lower HSV bound of the key colour.
    pub fn lower_bound(&self) -> [i32; 3] {
        [
            self.hue_center - self.hue_tolerance,
            self.saturation_min,
            self.value_min,
        ]
    }

    /// Inclusive upper HSV bound of the key colour.
    pub fn upper_bound(&self) -> [i32; 3] {
        [self.hue_center + self.hue_tolerance, 255, 255]
    }

    /// Whether any sticker sub-step is enabled.
    pub fn has_effects(&self) -> bool {
        self.effects.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Optional outputs derived from the keyed frame set.
///
/// Exports are not recorded on the job. They share the key stem of
/// `keyed_result_ref`, with `.gif` and `.tar.gz` in place of `.webm`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExportOptions {
    /// Palette-optimised animated GIF
    #[serde(default)]
    pub gif: bool,
    /// Gzipped tar of the RGBA PNG frames
    #[serde(default)]
    pub frame_archive: bool,
}
