use axum::extract::{Multipart, State};
use axum::Json;

use super::{AdminCustomer, AppState, ValidatedJson};
use crate::error::{EcommerceError, Result};
use crate::integrations::{PresignedUpload, StoredObject};
use crate::services::uploads::{ImageUpload, PresignRequest};

fn multipart_error(e: axum::extract::multipart::MultipartError) -> EcommerceError {
    EcommerceError::validation(e.body_text())
}

/// Reads the `file` part and an optional `folder` text part.
pub(super) async fn read_image_form(mut form: Multipart) -> Result<(ImageUpload, Option<String>)> {
    let mut upload = None;
    let mut folder = None;
    while let Some(field) = form.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
                upload = Some(ImageUpload { bytes, file_name, content_type });
            }
            Some("folder") => {
                let text = field.text().await.map_err(multipart_error)?;
                folder = Some(text.trim().to_string()).filter(|f| !f.is_empty());
            }
            _ => {}
        }
    }
    let upload = upload.ok_or_else(|| EcommerceError::validation("No file uploaded"))?;
    Ok((upload, folder))
}

pub async fn presign(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    ValidatedJson(body): ValidatedJson<PresignRequest>,
) -> Result<Json<PresignedUpload>> {
    Ok(Json(s.services.uploads.presign(body).await?))
}

pub async fn upload_image(State(s): State<AppState>, _admin: AdminCustomer, form: Multipart) -> Result<Json<StoredObject>> {
    let (upload, folder) = read_image_form(form).await?;
    Ok(Json(s.services.uploads.upload_image(upload, folder).await?))
}
