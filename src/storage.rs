use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::config::S3Config;

/// URL prefix under which [`LocalStorage`] files are served.
pub const MEDIA_URL: &str = "/media";

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    /// A URL the client can GET the object from for at least `seconds`.
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
}

/// Uploaded keys are never rewritten, so clients may cache them indefinitely.
const IMMUTABLE_CACHE: &str = "public, max-age=31536000, immutable";
/// S3 rejects presigned URLs valid for longer than a week.
const MAX_PRESIGN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn presign_ttl(seconds: u64) -> Duration {
    Duration::from_secs(seconds.max(1)).min(MAX_PRESIGN)
}

/// Recipe images in an S3-compatible bucket, addressed path-style.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(cfg: &S3Config) -> anyhow::Result<Self> {
        let credentials = Credentials::new(
            cfg.access_key.as_str(),
            cfg.secret_key.as_str(),
            None,
            None,
            "recipebook-env",
        );
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(cfg.endpoint.as_str())
            .load()
            .await;

        let client = Client::from_conf(
            S3ConfigBuilder::from(&shared)
                .endpoint_url(cfg.endpoint.as_str())
                .force_path_style(true)
                .build(),
        );
        debug!(endpoint = %cfg.endpoint, bucket = %cfg.bucket, "s3 storage configured");
        Ok(Self {
            client,
            bucket: cfg.bucket.clone(),
        })
    }

    fn describe(&self, op: &str, key: &str) -> String {
        format!("s3 {op} s3://{}/{key}", self.bucket)
    }
}

#[async_trait]
impl StorageClient for S3Storage {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .cache_control(IMMUTABLE_CACHE)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| self.describe("put", key))?;
        debug!(key = %key, size, "image uploaded to s3");
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| self.describe("delete", key))?;
        Ok(())
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let presigning = PresigningConfig::expires_in(presign_ttl(seconds))
            .with_context(|| self.describe("presign config", key))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .with_context(|| self.describe("presign", key))?;
        Ok(presigned.uri().to_string())
    }
}

/// Files under a directory on local disk, served at [`MEDIA_URL`].
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(
            !key.split('/').any(|seg| seg == ".." || seg.is_empty()),
            "invalid storage key {key}"
        );
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create {}", parent.display()))?;
        }
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    async fn presign_get(&self, key: &str, _seconds: u64) -> anyhow::Result<String> {
        self.path_for(key)?;
        Ok(format!("{MEDIA_URL}/{key}"))
    }
}
