//! Sticker effect parameters.
//!
//! Every sub-step is optional; an absent step is skipped. Steps always run
//! in the fixed order displacement, multiply, screen, surface bevel, edge
//! bevel, drop shadow.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Full set of sticker effects for one keying job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct EffectSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub displacement: Option<DisplacementSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub multiply: Option<MultiplySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub screen: Option<ScreenSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub surface_bevel: Option<SurfaceBevelSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub edge_bevel: Option<EdgeBevelSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub drop_shadow: Option<DropShadowSettings>,
}

impl EffectSettings {
    pub fn is_empty(&self) -> bool {
        self.displacement.is_none()
            && self.multiply.is_none()
            && self.screen.is_none()
            && self.surface_bevel.is_none()
            && self.edge_bevel.is_none()
            && self.drop_shadow.is_none()
    }

    /// Whether a displacement texture must be loaded.
    ///
    /// The multiply blend reuses the displacement texture.
    pub fn needs_displacement_texture(&self) -> bool {
        self.displacement.is_some() || self.multiply.is_some()
    }
}

/// Luminance-driven warp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct DisplacementSettings {
    /// Maximum offset in pixels at luminance 0 or 1
    #[validate(range(min = 0.0, max = 256.0))]
    #[serde(default = "default_displacement_intensity")]
    pub intensity: f32,
    /// Video or image used as the displacement (and multiply) texture
    pub texture_uri: String,
}

fn default_displacement_intensity() -> f32 {
    8.0
}

/// Multiply blend of the displacement texture, clipped to the subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct MultiplySettings {
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_multiply_opacity")]
    pub opacity: f32,
    /// Used when no displacement step is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture_uri: Option<String>,
}

fn default_multiply_opacity() -> f32 {
    0.5
}

/// Additive (linear dodge) blend of a second texture, clipped to the subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ScreenSettings {
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_screen_opacity")]
    pub opacity: f32,
    pub texture_uri: String,
}

fn default_screen_opacity() -> f32 {
    0.35
}

/// Emboss from the frame's own luminance contours, overlay-blended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SurfaceBevelSettings {
    #[validate(range(min = 0.0, max = 10.0))]
    #[serde(default = "default_surface_depth")]
    pub depth: f32,
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_surface_opacity")]
    pub opacity: f32,
}

fn default_surface_depth() -> f32 {
    1.0
}

fn default_surface_opacity() -> f32 {
    0.5
}

impl Default for SurfaceBevelSettings {
    fn default() -> Self {
        Self {
            depth: default_surface_depth(),
            opacity: default_surface_opacity(),
        }
    }
}

/// Highlight/shadow rim along the alpha edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct EdgeBevelSettings {
    /// Direction the light comes from, degrees counter-clockwise from +x
    #[validate(range(min = 0.0, max = 360.0))]
    #[serde(default = "default_light_angle")]
    pub light_angle_deg: f32,
    #[validate(range(min = 0.0, max = 4.0))]
    #[serde(default = "default_edge_intensity")]
    pub intensity: f32,
    /// Gaussian kernel applied to the highlight and shadow masks (0 = none)
    #[validate(range(max = 51))]
    #[serde(default = "default_edge_blur")]
    pub blur: u32,
}

fn default_light_angle() -> f32 {
    135.0
}

fn default_edge_intensity() -> f32 {
    0.6
}

fn default_edge_blur() -> u32 {
    3
}

impl Default for EdgeBevelSettings {
    fn default() -> Self {
        Self {
            light_angle_deg: default_light_angle(),
            intensity: default_edge_intensity(),
            blur: default_edge_blur(),
        }
    }
}

/// Blurred, offset silhouette composited underneath the subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct DropShadowSettings {
    #[validate(range(min = -256, max = 256))]
    #[serde(default = "default_shadow_offset")]
    pub offset_x: i32,
    #[validate(range(min = -256, max = 256))]
    #[serde(default = "default_shadow_offset")]
    pub offset_y: i32,
    #[validate(range(max = 101))]
    #[serde(default = "default_shadow_blur")]
    pub blur: u32,
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_shadow_opacity")]
    pub opacity: f32,
}

fn default_shadow_offset() -> i32 {
    8
}

fn default_shadow_blur() -> u32 {
    9
}

fn default_shadow_opacity() -> f32 {
    0.5
}

impl Default for DropShadowSettings {
    fn default() -> Self {
        Self {
            offset_x: default_shadow_offset(),
            offset_y: default_shadow_offset(),
            blur: default_shadow_blur(),
            opacity: default_shadow_opacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_effects() {
        let effects = EffectSettings::default();
        assert!(effects.is_empty());
        assert!(!effects.needs_displacement_texture());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let effects: EffectSettings = serde_json::from_str(
            r#"{"multiply": {"texture_uri": "/static/tex/paper.mp4"}, "edge_bevel": {}}"#,
        )
        .unwrap();

        assert!(effects.needs_displacement_texture());
        assert_eq!(effects.multiply.as_ref().unwrap().opacity, 0.5);
        assert_eq!(effects.edge_bevel.as_ref().unwrap().light_angle_deg, 135.0);
        assert!(effects.validate().is_ok());
    }

    #[test]
    fn test_nested_validation() {
        let effects = EffectSettings {
            screen: Some(ScreenSettings {
                opacity: 1.5,
                texture_uri: "/static/tex/glow.mp4".into(),
            }),
            ..Default::default()
        };
        assert!(effects.validate().is_err());
    }
}
