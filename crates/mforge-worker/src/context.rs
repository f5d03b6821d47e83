//! Shared handles every job task works with.

use std::path::Path;
use std::sync::Arc;

use mforge_media::{MediaResult, StepRunner};
use mforge_provider::{Artifact, GenerationProvider};
use mforge_queue::JobStore;
use mforge_storage::{content_type_for, BlobStore};
use tracing::debug;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Capabilities and settings shared by all job tasks.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub store: Arc<dyn JobStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub provider: Arc<dyn GenerationProvider>,
    pub runner: Arc<dyn StepRunner>,
}

impl WorkerContext {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        provider: Arc<dyn GenerationProvider>,
        runner: Arc<dyn StepRunner>,
    ) -> Self {
        Self {
            config,
            store,
            blobs,
            provider,
            runner,
        }
    }

    /// Bytes behind a job input reference.
    ///
    /// References this worker's blob store issued are read from it, remote
    /// URLs are downloaded, and anything else must be an existing local file.
    pub async fn read_input(&self, reference: &str) -> WorkerResult<Vec<u8>> {
        if self.blobs.key_for_uri(reference).is_some() {
            return Ok(self.blobs.get_bytes(reference).await?);
        }
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return Ok(self.provider.fetch_artifact(reference).await?);
        }

        let path = Path::new(reference);
        if !path.is_file() {
            return Err(WorkerError::invalid_input(format!(
                "Input file not found: {}",
                reference
            )));
        }
        Ok(tokio::fs::read(path).await?)
    }

    /// Materialise a job input at `dest`.
    pub async fn fetch_input(&self, reference: &str, dest: &Path) -> WorkerResult<()> {
        let bytes = self.read_input(reference).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, bytes).await?;
        debug!("Fetched {} into {}", reference, dest.display());
        Ok(())
    }

    /// Re-store a provider artifact under `key`, returning its public URI.
    pub async fn store_artifact(&self, artifact: Artifact, key: &str) -> WorkerResult<String> {
        match artifact {
            Artifact::Uri(uri) => {
                let bytes = self.provider.fetch_artifact(&uri).await?;
                Ok(self.blobs.put_bytes(bytes, key, content_type_for(key)).await?)
            }
            Artifact::Text(_) => Err(WorkerError::processing_failed(format!(
                "expected a file for {} but the model returned text",
                key
            ))),
        }
    }
}

/// Run CPU-bound media work off the async runtime.
pub async fn run_blocking<T, F>(task: &str, f: F) -> WorkerResult<T>
where
    F: FnOnce() -> MediaResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| WorkerError::processing_failed(format!("{} task failed: {}", task, e)))?
        .map_err(WorkerError::from)
}

/// File name for a fetched input, keeping the reference's extension.
pub fn input_file_name(stem: &str, reference: &str, fallback_ext: &str) -> String {
    let name = reference
        .rsplit('/')
        .next()
        .unwrap_or("")
        .split(['?', '#'])
        .next()
        .unwrap_or("");
    let ext = match name.rsplit_once('.') {
        Some((base, ext))
            if !base.is_empty() && !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => fallback_ext.to_string(),
    };
    format!("{}.{}", stem, ext)
}
