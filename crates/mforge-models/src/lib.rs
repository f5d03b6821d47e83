//! Shared data models for the MediaForge job pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job types, statuses and claim lanes
//! - Chroma-key and sticker effect settings
//! - Type-specific input parameters
//! - Palette analysis results

pub mod effects;
pub mod job;
pub mod job_status;
pub mod job_type;
pub mod keying;
pub mod palette;
pub mod params;

// Re-export common types
pub use effects::{
    DisplacementSettings, DropShadowSettings, EdgeBevelSettings, EffectSettings,
    MultiplySettings, ScreenSettings, SurfaceBevelSettings,
};
pub use job::{Job, JobId, JobStatusView, NewJob, StatusWrite};
pub use job_status::{ClaimLane, JobStatus, JobStatusParseError};
pub use job_type::{JobType, JobTypeParseError};
pub use keying::{ExportOptions, KeyingSettings};
pub use palette::{render_analysis_text, PaletteColor, PaletteResult};
pub use params::{keys, InputParams};
pub use validator::{Validate, ValidationErrors};
