//! Error type shared by every layer, and its HTTP mapping.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use thiserror::Error;

use crate::domain::aggregates::CouponRejection;

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Admin only")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Not enough stock for {0}")]
    InsufficientStock(String),

    #[error("Invalid referral code")]
    InvalidReferralCode,

    #[error(transparent)]
    Coupon(#[from] CouponRejection),

    #[error("Only pending orders can be canceled")]
    OrderNotCancellable,

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

impl EcommerceError {
    pub fn validation(message: impl Into<String>) -> Self { Self::Validation(message.into()) }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InsufficientStock(_)
            | Self::InvalidReferralCode
            | Self::Coupon(_)
            | Self::OrderNotCancellable => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for EcommerceError {
    fn from(error: sqlx::Error) -> Self {
        match error.as_database_error().map(|e| e.kind()) {
            Some(sqlx::error::ErrorKind::UniqueViolation) => Self::Conflict("Duplicate value".to_string()),
            _ => Self::Storage(error.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        Self::Validation(format!("Invalid fields: {}", fields.join(", ")))
    }
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = serde_json::json!({
            "statusCode": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_are_client_errors() {
        assert_eq!(EcommerceError::InsufficientStock("Mango".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(EcommerceError::InsufficientStock("Mango".into()).to_string(), "Not enough stock for Mango");
        assert_eq!(EcommerceError::Coupon(CouponRejection::AlreadyUsed).status(), StatusCode::BAD_REQUEST);
        assert_eq!(EcommerceError::NotFound("Order").to_string(), "Order not found");
        assert_eq!(EcommerceError::Forbidden.status(), StatusCode::FORBIDDEN);
    }
}
