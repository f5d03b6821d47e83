//! The generation capability.

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::request::{Artifact, GenerationRequest};

/// Opaque third-party generation service.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Run one generation to completion.
    async fn generate(&self, request: GenerationRequest) -> ProviderResult<Artifact>;

    /// Download the bytes behind an [`Artifact::Uri`].
    async fn fetch_artifact(&self, uri: &str) -> ProviderResult<Vec<u8>>;
}
