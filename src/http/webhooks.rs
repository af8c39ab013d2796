use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use super::AppState;
use crate::error::{EcommerceError, Result};
use crate::services::reminders::{DeliveryAck, ReminderPayload};

const SIGNATURE_HEADER: &str = "upstash-signature";

/// Delayed reminder callback. The body is verified before it is parsed.
pub async fn qstash_email(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<DeliveryAck>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = s.verifier.verify(signature, &body) {
        tracing::warn!(error = %e, "rejected webhook signature");
        return Err(EcommerceError::Unauthorized("Invalid signature".into()));
    }
    let payload: ReminderPayload = serde_json::from_slice(&body)
        .map_err(|e| EcommerceError::validation(format!("Invalid webhook payload: {e}")))?;
    Ok(Json(s.services.reminders.deliver(payload).await?))
}
