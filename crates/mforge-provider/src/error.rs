//! Provider error types.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider configuration error: {0}")]
    ConfigError(String),

    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{0}")]
    EmptyOutput(String),

    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    #[error("Artifact download failed: {0}")]
    DownloadFailed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn empty_output(msg: impl Into<String>) -> Self {
        Self::EmptyOutput(msg.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }
}
