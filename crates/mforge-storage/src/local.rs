//! Filesystem blob store served under a static URL prefix.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::keys::validate_key;
use crate::store::BlobStore;

/// URL prefix the static directory is served under.
pub const DEFAULT_PUBLIC_PREFIX: &str = "/static";

/// Stores objects as files under `root`; URIs look like `/static/{key}`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
        }
    }

    pub fn with_public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for `key`.
    pub fn path_for_key(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn path_for_uri(&self, uri: &str) -> StorageResult<PathBuf> {
        let key = self.require_key(uri)?;
        self.path_for_key(&key)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    fn key_for_uri(&self, uri: &str) -> Option<String> {
        uri.strip_prefix(&self.public_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|key| validate_key(key).is_ok())
            .map(str::to_string)
    }

    fn uri_for_key(&self, key: &str) -> String {
        format!("{}/{}", self.public_prefix, key)
    }

    async fn put_bytes(&self, data: Vec<u8>, key: &str, _content_type: &str) -> StorageResult<String> {
        let path = self.path_for_key(key)?;
        debug!("Writing {} bytes to {}", data.len(), path.display());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::upload_failed(format!("Failed to create directory: {}", e)))?;
        }
        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);
        tokio::fs::write(&partial, &data)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;
        tokio::fs::rename(&partial, &path).await?;

        info!("Stored {}", key);
        Ok(self.uri_for_key(key))
    }

    async fn get_bytes(&self, uri: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for_uri(uri)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(uri)),
            Err(e) => Err(StorageError::download_failed(e.to_string())),
        }
    }

    async fn exists(&self, uri: &str) -> StorageResult<bool> {
        let path = self.path_for_uri(uri)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, uri: &str) -> StorageResult<()> {
        let path = self.path_for_uri(uri)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let uri = store
            .put_bytes(b"hello".to_vec(), "library/a.png", "image/png")
            .await
            .unwrap();
        assert_eq!(uri, "/static/library/a.png");
        assert!(dir.path().join("library/a.png").exists());
        assert_eq!(store.get_bytes(&uri).await.unwrap(), b"hello");
        assert!(store.exists(&uri).await.unwrap());

        store.delete(&uri).await.unwrap();
        assert!(!store.exists(&uri).await.unwrap());
        assert!(matches!(
            store.get_bytes(&uri).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_file_and_fetch() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("static"));
        let src = dir.path().join("clip.mp4");
        std::fs::write(&src, vec![7u8; 64]).unwrap();

        let uri = store.put_file(&src, "animations/generated/x.mp4").await.unwrap();
        let dest = dir.path().join("work/in/x.mp4");
        store.fetch_to_file(&uri, &dest).await.unwrap();
        assert_eq!(std::fs::read(dest).unwrap(), vec![7u8; 64]);
    }

    #[test]
    fn test_uri_ownership() {
        let store = LocalBlobStore::new("/srv/static");
        assert_eq!(
            store.key_for_uri("/static/library/a.png").as_deref(),
            Some("library/a.png")
        );
        assert!(store.key_for_uri("https://cdn.example.com/a.png").is_none());
        assert!(store.key_for_uri("/static/../secret").is_none());
        assert!(store.key_for_uri("/staticfoo/a.png").is_none());

        let custom = LocalBlobStore::new("/srv").with_public_prefix("/media/");
        assert_eq!(custom.uri_for_key("a.png"), "/media/a.png");
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());
        assert!(matches!(
            store.put_bytes(vec![1], "../escape.png", "image/png").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get_bytes("/elsewhere/a.png").await,
            Err(StorageError::ForeignUri(_))
        ));
    }
}
