//! Image uploads into object storage.

use std::sync::Arc;

use serde::Deserialize;
use validator::Validate;

use crate::error::{EcommerceError, Result};
use crate::integrations::{ObjectStorage, PresignedUpload, StoredObject};

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// A file received from a multipart form.
#[derive(Clone, Debug)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

impl ImageUpload {
    pub fn check(&self) -> Result<()> {
        if !self.content_type.starts_with("image/") {
            return Err(EcommerceError::validation("Only image uploads are allowed"));
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(EcommerceError::validation("File too large (max 10MB)"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    #[validate(length(min = 1))]
    pub file_name: String,
    #[validate(length(min = 1))]
    pub content_type: String,
    pub folder: Option<String>,
}

#[derive(Clone)]
pub struct UploadService {
    storage: Arc<dyn ObjectStorage>,
}

impl UploadService {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self { Self { storage } }

    pub async fn presign(&self, request: PresignRequest) -> Result<PresignedUpload> {
        Ok(self.storage.presign_put(&request.file_name, &request.content_type, request.folder).await?)
    }

    pub async fn upload_image(&self, upload: ImageUpload, folder: Option<String>) -> Result<StoredObject> {
        upload.check()?;
        let stored = self.storage.put_object(upload.bytes, &upload.file_name, &upload.content_type, folder).await?;
        tracing::info!(key = %stored.key, "image uploaded");
        Ok(stored)
    }
}
