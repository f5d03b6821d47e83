//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Missing or unusable job parameters; the message is stored as-is.
    #[error("{0}")]
    InvalidInput(String),

    /// A handler failure carrying the handler's label.
    #[error("{label}: {message}")]
    Handler {
        label: &'static str,
        message: String,
    },

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] mforge_queue::StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] mforge_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] mforge_media::MediaError),

    #[error("Provider error: {0}")]
    Provider(#[from] mforge_provider::ProviderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Prefix the failure with the handler's label.
    ///
    /// Input errors keep their own wording.
    pub fn labelled(self, label: &'static str) -> Self {
        match self {
            WorkerError::InvalidInput(_) | WorkerError::Handler { .. } => self,
            other => Self::Handler {
                label,
                message: other.to_string(),
            },
        }
    }

    /// Transient job store contention worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::Store(e) if e.is_busy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_wraps_provider_errors() {
        let err = WorkerError::from(mforge_provider::ProviderError::empty_output(
            "kwaivgi/kling-v2.1 did not return an output URL",
        ))
        .labelled("Animation generation error");
        assert_eq!(
            err.to_string(),
            "Animation generation error: kwaivgi/kling-v2.1 did not return an output URL"
        );
    }

    #[test]
    fn test_labelled_keeps_input_errors() {
        let err = WorkerError::invalid_input("No image path provided for background removal.")
            .labelled("Background removal error");
        assert_eq!(err.to_string(), "No image path provided for background removal.");
    }

    #[test]
    fn test_labelled_is_not_applied_twice() {
        let err = WorkerError::processing_failed("boom")
            .labelled("Keying error")
            .labelled("Other");
        assert_eq!(err.to_string(), "Keying error: Processing failed: boom");
    }
}
