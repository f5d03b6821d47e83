//! S3-compatible blob store.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::keys::validate_key;
use crate::store::BlobStore;

/// Configuration for the S3 client.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Bucket name
    pub bucket: String,
    /// Region (defaults to us-east-1)
    pub region: String,
    /// Custom endpoint for S3-compatible services
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// CDN base URL; objects are addressed as `{base}/{key}` when set
    pub public_base_url: Option<String>,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Ok(Self {
            bucket: non_empty("S3_BUCKET")
                .ok_or_else(|| StorageError::config_error("S3_BUCKET not set"))?,
            region: non_empty("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            endpoint_url: non_empty("S3_ENDPOINT_URL"),
            access_key_id: non_empty("AWS_ACCESS_KEY_ID"),
            secret_access_key: non_empty("AWS_SECRET_ACCESS_KEY"),
            public_base_url: non_empty("CLOUDFRONT_URL")
                .map(|u| u.trim_end_matches('/').to_string()),
        })
    }
}

/// Blob store backed by an S3 bucket.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base_url: Option<String>,
}

impl S3BlobStore {
    /// Create a new client from configuration.
    ///
    /// Static credentials are used when both keys are configured; otherwise
    /// the default AWS provider chain applies.
    pub async fn new(config: S3Config) -> StorageResult<Self> {
        let mut builder = match (&config.access_key_id, &config.secret_access_key) {
            (Some(key), Some(secret)) => Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(key, secret, None, None, "mforge")),
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                Builder::from(&shared)
            }
        };
        builder = builder.region(Region::new(config.region.clone()));

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            public_base_url: config.public_base_url,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        Self::new(S3Config::from_env()?).await
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("S3 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

/// Strip either the public base or the `s3://bucket/` form from `uri`.
fn key_from_uri(uri: &str, bucket: &str, public_base: Option<&str>) -> Option<String> {
    let s3_prefix = format!("s3://{}/", bucket);
    let key = match public_base {
        Some(base) => uri
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .or_else(|| uri.strip_prefix(&s3_prefix)),
        None => uri.strip_prefix(&s3_prefix),
    }?;
    validate_key(key).ok().map(|_| key.to_string())
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn backend(&self) -> &'static str {
        "s3"
    }

    fn key_for_uri(&self, uri: &str) -> Option<String> {
        key_from_uri(uri, &self.bucket, self.public_base_url.as_deref())
    }

    fn uri_for_key(&self, key: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base, key),
            None => format!("s3://{}/{}", self.bucket, key),
        }
    }

    async fn put_bytes(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<String> {
        validate_key(key)?;
        debug!("Uploading {} bytes to {}", data.len(), key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {}", key);
        Ok(self.uri_for_key(key))
    }

    async fn get_bytes(&self, uri: &str) -> StorageResult<Vec<u8>> {
        let key = self.require_key(uri)?;
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if e.to_string().contains("NoSuchKey") {
                    StorageError::not_found(key.as_str())
                } else {
                    StorageError::download_failed(e.to_string())
                }
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    async fn exists(&self, uri: &str) -> StorageResult<bool> {
        let key = self.require_key(uri)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.to_string().contains("NotFound") || e.to_string().contains("NoSuchKey") {
                    Ok(false)
                } else {
                    Err(StorageError::AwsSdk(e.to_string()))
                }
            }
        }
    }

    async fn delete(&self, uri: &str) -> StorageResult<()> {
        let key = self.require_key(uri)?;
        debug!("Deleting {}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::delete_failed(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(public: Option<&str>) -> S3Config {
        S3Config {
            bucket: "media".into(),
            region: "us-east-1".into(),
            endpoint_url: Some("http://127.0.0.1:9000".into()),
            access_key_id: Some("test".into()),
            secret_access_key: Some("secret".into()),
            public_base_url: public.map(str::to_string),
        }
    }

    #[test]
    fn test_key_from_uri() {
        assert_eq!(
            key_from_uri("s3://media/library/a.png", "media", None).as_deref(),
            Some("library/a.png")
        );
        assert_eq!(
            key_from_uri("https://cdn.test/library/a.png", "media", Some("https://cdn.test"))
                .as_deref(),
            Some("library/a.png")
        );
        assert!(key_from_uri("s3://other/a.png", "media", None).is_none());
        assert!(key_from_uri("https://elsewhere.test/a.png", "media", Some("https://cdn.test")).is_none());
        assert!(key_from_uri("s3://media/../a.png", "media", None).is_none());
    }

    #[tokio::test]
    async fn test_uri_round_trip() {
        let store = S3BlobStore::new(config(Some("https://cdn.test"))).await.unwrap();
        let uri = store.uri_for_key("animations/keyed/1_x.webm");
        assert_eq!(uri, "https://cdn.test/animations/keyed/1_x.webm");
        assert_eq!(
            store.key_for_uri(&uri).as_deref(),
            Some("animations/keyed/1_x.webm")
        );

        let bare = S3BlobStore::new(config(None)).await.unwrap();
        assert_eq!(bare.uri_for_key("a.png"), "s3://media/a.png");
        assert_eq!(bare.backend(), "s3");
    }
}
