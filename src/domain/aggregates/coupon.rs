//! Coupon Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{Money, PublicCode};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: PublicCode,
    pub customer_id: Uuid,
    pub value: Money,
    pub is_used: bool,
    pub used_in_order_id: Option<Uuid>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Why a coupon cannot be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CouponRejection {
    #[error("Invalid coupon code")]
    Unknown,
    #[error("This coupon is no longer active")]
    Inactive,
    #[error("This coupon has already been used")]
    AlreadyUsed,
    #[error("This coupon does not belong to you")]
    NotOwner,
    #[error("This coupon has expired")]
    Expired,
}

impl Coupon {
    pub fn issue(code: PublicCode, customer_id: Uuid, value: Money, expiry_date: Option<DateTime<Utc>>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), code, customer_id, value, is_used: false, used_in_order_id: None,
            expiry_date, active: true, description, created_at: now, updated_at: now,
        }
    }

    /// Checks, in order: active, unused, owner, expiry.
    pub fn check_redeemable(&self, customer_id: Uuid, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.active { return Err(CouponRejection::Inactive); }
        if self.is_used { return Err(CouponRejection::AlreadyUsed); }
        if self.customer_id != customer_id { return Err(CouponRejection::NotOwner); }
        if self.expiry_date.is_some_and(|expiry| expiry < now) { return Err(CouponRejection::Expired); }
        Ok(())
    }

    pub fn mark_used(&mut self, order_id: Uuid) -> Result<(), CouponRejection> {
        if self.is_used { return Err(CouponRejection::AlreadyUsed); }
        self.is_used = true;
        self.used_in_order_id = Some(order_id);
        self.updated_at = Utc::now();
        Ok(())
    }
}
