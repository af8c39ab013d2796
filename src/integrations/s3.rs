//! Image storage in S3-compatible buckets.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use serde::Serialize;
use uuid::Uuid;

use super::IntegrationError;
use crate::config::S3Config;

const DEFAULT_REGION: &str = "ap-southeast-2";
const DEFAULT_FOLDER: &str = "products";
const PRESIGN_TTL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub file_url: String,
    pub key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub upload_url: String,
    pub file_url: String,
    pub key: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put_object(&self, bytes: Vec<u8>, file_name: &str, content_type: &str, folder: Option<String>) -> Result<StoredObject, IntegrationError>;
    async fn presign_put(&self, file_name: &str, content_type: &str, folder: Option<String>) -> Result<PresignedUpload, IntegrationError>;
}

/// `<folder>/<uuid><ext>`, with the extension taken from the last path segment.
pub fn object_key(folder: Option<&str>, file_name: &str, id: Uuid) -> String {
    let clean = file_name.rsplit('/').next().unwrap_or_default();
    let ext = clean.rfind('.').map(|i| &clean[i..]).unwrap_or_default();
    let folder = folder.map(|f| f.trim_matches('/')).filter(|f| !f.is_empty()).unwrap_or(DEFAULT_FOLDER);
    format!("{folder}/{id}{ext}")
}

pub fn public_base_url(configured: Option<&str>, bucket: &str, region: &str) -> String {
    let base = configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("https://{bucket}.s3.{region}.amazonaws.com"));
    base.trim_end_matches('/').to_string()
}

pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_base_url: String,
    acl: Option<ObjectCannedAcl>,
}

impl S3Storage {
    /// `None` when no bucket is configured.
    pub async fn from_config(config: &S3Config) -> Option<Self> {
        let bucket = config.bucket.clone()?;
        let region = config.region.clone().unwrap_or_else(|| DEFAULT_REGION.to_string());
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.clone()))
            .load()
            .await;
        Some(Self {
            client: aws_sdk_s3::Client::new(&shared),
            public_base_url: public_base_url(config.public_base_url.as_deref(), &bucket, &region),
            bucket,
            acl: config.object_acl.as_deref().map(ObjectCannedAcl::from),
        })
    }
}

fn storage_error<E: std::error::Error>(error: E) -> IntegrationError {
    IntegrationError::Storage(DisplayErrorContext(error).to_string())
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(&self, bytes: Vec<u8>, file_name: &str, content_type: &str, folder: Option<String>) -> Result<StoredObject, IntegrationError> {
        let key = object_key(folder.as_deref(), file_name, Uuid::new_v4());
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .set_acl(self.acl.clone())
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e).to_string();
                if detail.contains("AccessControlListNotSupported") {
                    IntegrationError::Storage(
                        "bucket does not allow ACLs; unset AWS_S3_OBJECT_ACL and serve objects through a bucket policy".into(),
                    )
                } else {
                    IntegrationError::Storage(detail)
                }
            })?;
        tracing::info!(key = %key, size, "object uploaded");
        Ok(StoredObject { file_url: format!("{}/{key}", self.public_base_url), key })
    }

    async fn presign_put(&self, file_name: &str, content_type: &str, folder: Option<String>) -> Result<PresignedUpload, IntegrationError> {
        let key = object_key(folder.as_deref(), file_name, Uuid::new_v4());
        let presigning = PresigningConfig::expires_in(PRESIGN_TTL).map_err(storage_error)?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(storage_error)?;
        Ok(PresignedUpload {
            upload_url: request.uri().to_string(),
            file_url: format!("{}/{key}", self.public_base_url),
            key,
        })
    }
}

/// Used when no bucket is configured: every call fails.
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredStorage;

#[async_trait]
impl ObjectStorage for UnconfiguredStorage {
    async fn put_object(&self, _bytes: Vec<u8>, _file_name: &str, _content_type: &str, _folder: Option<String>) -> Result<StoredObject, IntegrationError> {
        Err(IntegrationError::NotConfigured("AWS_S3_BUCKET"))
    }

    async fn presign_put(&self, _file_name: &str, _content_type: &str, _folder: Option<String>) -> Result<PresignedUpload, IntegrationError> {
        Err(IntegrationError::NotConfigured("AWS_S3_BUCKET"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key() {
        let id = Uuid::nil();
        assert_eq!(object_key(Some("/categories/"), "photos/cake.PNG", id), format!("categories/{id}.PNG"));
        assert_eq!(object_key(None, "README", id), format!("products/{id}"));
        assert_eq!(object_key(Some(""), "a.b.jpg", id), format!("products/{id}.jpg"));
    }

    #[test]
    fn test_public_base_url() {
        assert_eq!(public_base_url(None, "shop", "ap-southeast-2"), "https://shop.s3.ap-southeast-2.amazonaws.com");
        assert_eq!(public_base_url(Some("https://cdn.shop.io/"), "shop", "x"), "https://cdn.shop.io");
    }

    #[tokio::test]
    async fn test_unconfigured_storage_fails() {
        let err = UnconfiguredStorage.presign_put("a.png", "image/png", None).await.unwrap_err();
        assert!(matches!(err, IntegrationError::NotConfigured("AWS_S3_BUCKET")));
    }
}
