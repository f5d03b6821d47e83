//! The blob storage capability.

use std::path::Path;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::keys::content_type_for;

/// Persistent binary storage addressed by key on write and by URI on read.
///
/// URIs returned by `put_*` are what jobs record in `result_ref`; any URI a
/// store issued resolves back through [`BlobStore::key_for_uri`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short name for logs (`local`, `s3`).
    fn backend(&self) -> &'static str;

    /// The key behind `uri`, or `None` when this store did not issue it.
    fn key_for_uri(&self, uri: &str) -> Option<String>;

    /// The public URI for `key`.
    fn uri_for_key(&self, key: &str) -> String;

    async fn put_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String>;

    async fn get_bytes(&self, uri: &str) -> StorageResult<Vec<u8>>;

    async fn exists(&self, uri: &str) -> StorageResult<bool>;

    async fn delete(&self, uri: &str) -> StorageResult<()>;

    /// Upload a local file; the content type follows the key's extension.
    async fn put_file(&self, path: &Path, key: &str) -> StorageResult<String> {
        let data = tokio::fs::read(path).await?;
        self.put_bytes(data, key, content_type_for(key)).await
    }

    /// Download `uri` into `dest`, creating parent directories.
    async fn fetch_to_file(&self, uri: &str, dest: &Path) -> StorageResult<()> {
        let bytes = self.get_bytes(uri).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, bytes).await?;
        Ok(())
    }

    /// Resolve `uri` to a key or fail with [`StorageError::ForeignUri`].
    fn require_key(&self, uri: &str) -> StorageResult<String> {
        self.key_for_uri(uri)
            .ok_or_else(|| StorageError::ForeignUri(uri.to_string()))
    }
}
