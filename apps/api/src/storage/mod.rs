//! Blob Store: original uploads and operator revisions, addressed by opaque
//! keys derived from the order id.

#[cfg(test)]
use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use thiserror::Error;
#[cfg(test)]
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::config::S3Config;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Original,
    Revised,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Original => "original",
            FileKind::Revised => "revised",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Bytes,
    pub content_type: String,
}

/// `orders/{order_id}/{original|revised}/{sanitized filename}`
pub fn object_key(order_id: Uuid, kind: FileKind, filename: &str) -> String {
    format!("orders/{order_id}/{kind}/{}", sanitize_filename(filename))
}

/// The filename part of a key, used for download dispositions.
pub fn key_filename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
/// Leading dots are dropped so a key segment can never be `..`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "resume".to_string()
    } else {
        cleaned.chars().take(120).collect()
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), BlobError>;
    async fn get(&self, key: &str) -> Result<Blob, BlobError>;
}

/// S3 or any S3-compatible service (MinIO, R2).
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    /// Constructs an S3 client for a custom endpoint (local MinIO, R2) or AWS.
    pub async fn from_config(config: &S3Config, timeout: std::time::Duration) -> Self {
        use aws_config::timeout::TimeoutConfig;
        use aws_config::Region;
        use aws_sdk_s3::config::Credentials;

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "shortlist-static",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint.is_some())
            .build();

        Self::new(aws_sdk_s3::Client::from_conf(s3_config), config.bucket.clone())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), BlobError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                BlobError::Backend(format!("S3 upload failed: {}", DisplayErrorContext(&e)))
            })?;

        info!("Uploaded {size} bytes to s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Blob, BlobError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let not_found = e
                    .as_service_error()
                    .is_some_and(|se| se.is_no_such_key());
                if not_found {
                    BlobError::NotFound(key.to_string())
                } else {
                    BlobError::Backend(format!("S3 download failed: {}", DisplayErrorContext(&e)))
                }
            })?;

        let content_type = output
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| BlobError::Backend(format!("S3 body read failed: {e}")))?
            .into_bytes();

        Ok(Blob {
            bytes,
            content_type,
        })
    }
}

/// Process-local store backing the router tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Blob>>,
}

#[cfg(test)]
impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), BlobError> {
        self.objects.write().await.insert(
            key.to_string(),
            Blob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Blob, BlobError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }
}
