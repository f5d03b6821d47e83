//! Client for third-party generative AI services.
//!
//! All text-to-image, background-removal, vision-analysis and
//! image-to-video calls go through the [`GenerationProvider`] trait.

pub mod error;
pub mod http;
pub mod provider;
pub mod request;

pub use error::{ProviderError, ProviderResult};
pub use http::{HttpGenerationProvider, ProviderConfig};
pub use provider::GenerationProvider;
pub use request::{Artifact, Capability, GenerationRequest, ImageInput, ResponseFormat};
