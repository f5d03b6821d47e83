//! Job type definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of work a job represents.
///
/// Decides which handler runs once the job is claimed through the
/// generation lane. Jobs claimed through the keying lane ignore their type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Text-to-image generation
    ImageGeneration,
    /// Cut the subject out of a still image
    BackgroundRemoval,
    /// Vision analysis describing the style of an image
    StyleAnalysis,
    /// Vision analysis extracting the dominant colour palette
    PaletteAnalysis,
    /// Vision analysis proposing an animation prompt
    AnimationPrompting,
    /// Image-to-video generation
    Animation,
    /// Concatenate two clips into one
    VideoStitching,
    /// Meta-job: A->B and B->A animations stitched into a loop
    BoomerangAutomation,
    /// User-supplied footage waiting to be keyed
    #[serde(alias = "video_upload")]
    UploadedVideoKeying,
}

impl JobType {
    /// Every job type.
    pub const ALL: &'static [JobType] = &[
        JobType::ImageGeneration,
        JobType::BackgroundRemoval,
        JobType::StyleAnalysis,
        JobType::PaletteAnalysis,
        JobType::AnimationPrompting,
        JobType::Animation,
        JobType::VideoStitching,
        JobType::BoomerangAutomation,
        JobType::UploadedVideoKeying,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ImageGeneration => "image_generation",
            JobType::BackgroundRemoval => "background_removal",
            JobType::StyleAnalysis => "style_analysis",
            JobType::PaletteAnalysis => "palette_analysis",
            JobType::AnimationPrompting => "animation_prompting",
            JobType::Animation => "animation",
            JobType::VideoStitching => "video_stitching",
            JobType::BoomerangAutomation => "boomerang_automation",
            JobType::UploadedVideoKeying => "uploaded_video_keying",
        }
    }

    /// Vision-analysis jobs whose result is text rather than a file.
    pub fn is_analysis(&self) -> bool {
        matches!(
            self,
            JobType::StyleAnalysis | JobType::PaletteAnalysis | JobType::AnimationPrompting
        )
    }

    /// Types whose output goes to manual review before keying.
    pub fn needs_review(&self) -> bool {
        matches!(self, JobType::Animation | JobType::VideoStitching)
    }

    /// Types whose result is footage that can be sent through keying.
    pub fn is_keyable(&self) -> bool {
        matches!(
            self,
            JobType::Animation | JobType::VideoStitching | JobType::UploadedVideoKeying
        )
    }

    /// Types that can be re-run with identical parameters.
    pub fn is_regenerable(&self) -> bool {
        matches!(self, JobType::ImageGeneration | JobType::Animation)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = JobTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image_generation" => Ok(JobType::ImageGeneration),
            "background_removal" => Ok(JobType::BackgroundRemoval),
            "style_analysis" => Ok(JobType::StyleAnalysis),
            "palette_analysis" => Ok(JobType::PaletteAnalysis),
            "animation_prompting" => Ok(JobType::AnimationPrompting),
            "animation" => Ok(JobType::Animation),
            "video_stitching" => Ok(JobType::VideoStitching),
            "boomerang_automation" => Ok(JobType::BoomerangAutomation),
            "uploaded_video_keying" | "video_upload" => Ok(JobType::UploadedVideoKeying),
            _ => Err(JobTypeParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown job type: {0}")]
pub struct JobTypeParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_types() {
        for t in JobType::ALL {
            assert_eq!(t.as_str().parse::<JobType>().unwrap(), *t);
        }
    }

    #[test]
    fn test_legacy_upload_alias() {
        assert_eq!(
            "video_upload".parse::<JobType>().unwrap(),
            JobType::UploadedVideoKeying
        );
        let parsed: JobType = serde_json::from_str("\"video_upload\"").unwrap();
        assert_eq!(parsed, JobType::UploadedVideoKeying);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!("frame_magic".parse::<JobType>().is_err());
    }
}
