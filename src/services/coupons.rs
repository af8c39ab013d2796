//! Customer coupons: issuing, admin maintenance and redemption checks.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Coupon, CouponRejection};
use crate::domain::value_objects::{Money, PublicCode};
use crate::error::{EcommerceError, Result};
use crate::store::Repositories;

const CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCoupon {
    pub customer_id: Uuid,
    pub value: Decimal,
    pub expiry_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CouponUpdate {
    pub value: Option<Decimal>,
    pub active: Option<bool>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

/// Coupon row in the admin listing, with its owner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponWithOwner {
    #[serde(flatten)]
    pub coupon: Coupon,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
}

/// What a customer learns about a code they are about to use.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponCheck {
    pub code: String,
    pub value: Money,
    pub description: Option<String>,
}

fn coupon_value(value: Decimal) -> Result<Money> {
    let value = Money::new(value);
    if value.is_negative() {
        return Err(EcommerceError::validation("value must not be negative"));
    }
    Ok(value.round())
}

#[derive(Clone)]
pub struct CouponService {
    repos: Repositories,
}

impl CouponService {
    pub fn new(repos: Repositories) -> Self { Self { repos } }

    /// Creates an active, unused coupon under a fresh code.
    pub async fn issue(&self, customer_id: Uuid, value: Money, description: Option<String>, expiry_date: Option<DateTime<Utc>>) -> Result<Coupon> {
        let code = self.unique_code().await?;
        let coupon = Coupon::issue(code, customer_id, value, expiry_date, description);
        self.repos.coupons.insert_coupon(&coupon).await?;
        tracing::info!(coupon_id = %coupon.id, customer_id = %customer_id, value = %value, "coupon issued");
        Ok(coupon)
    }

    async fn unique_code(&self) -> Result<PublicCode> {
        for _ in 0..CODE_ATTEMPTS {
            let code = PublicCode::random_upper();
            if !self.repos.coupons.coupon_code_taken(code.as_str()).await? {
                return Ok(code);
            }
        }
        Err(EcommerceError::validation("Failed to generate unique coupon code"))
    }

    pub async fn create(&self, input: NewCoupon) -> Result<Coupon> {
        if self.repos.customers.get_customer(input.customer_id).await?.is_none() {
            return Err(EcommerceError::NotFound("Customer"));
        }
        self.issue(input.customer_id, coupon_value(input.value)?, input.description, input.expiry_date).await
    }

    pub async fn list_all(&self) -> Result<Vec<CouponWithOwner>> {
        let coupons = self.repos.coupons.list_coupons().await?;
        let customers = self.repos.customers.list_customers().await?;
        Ok(coupons
            .into_iter()
            .map(|coupon| {
                let owner = customers.iter().find(|c| c.id == coupon.customer_id);
                CouponWithOwner {
                    customer_email: owner.map(|c| c.email.to_string()),
                    customer_name: owner.map(|c| {
                        format!("{} {}", c.first_name.as_deref().unwrap_or_default(), c.last_name.as_deref().unwrap_or_default())
                    }),
                    coupon,
                }
            })
            .collect())
    }

    pub async fn list_mine(&self, customer_id: Uuid) -> Result<Vec<Coupon>> {
        self.repos.coupons.list_available_coupons(customer_id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Coupon> {
        self.repos.coupons.get_coupon(id).await?.ok_or(EcommerceError::NotFound("Coupon"))
    }

    pub async fn update(&self, id: Uuid, input: CouponUpdate) -> Result<Coupon> {
        let mut coupon = self.get(id).await?;
        if let Some(value) = input.value { coupon.value = coupon_value(value)?; }
        if let Some(active) = input.active { coupon.active = active; }
        if input.expiry_date.is_some() { coupon.expiry_date = input.expiry_date; }
        if input.description.is_some() { coupon.description = input.description; }
        coupon.updated_at = Utc::now();
        self.repos.coupons.update_coupon(&coupon).await?;
        Ok(coupon)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if !self.repos.coupons.delete_coupon(id).await? {
            return Err(EcommerceError::NotFound("Coupon"));
        }
        Ok(())
    }

    /// Looks the code up and checks that `customer_id` may redeem it now.
    pub async fn validate(&self, raw: &str, customer_id: Uuid) -> Result<Coupon> {
        let code = PublicCode::normalize(raw).ok_or(CouponRejection::Unknown)?;
        let coupon = self.repos.coupons.find_coupon_by_code(code.as_str()).await?.ok_or(CouponRejection::Unknown)?;
        coupon.check_redeemable(customer_id, Utc::now())?;
        Ok(coupon)
    }

    pub async fn check(&self, raw: &str, customer_id: Uuid) -> Result<CouponCheck> {
        let coupon = self.validate(raw, customer_id).await?;
        Ok(CouponCheck { code: coupon.code.into_string(), value: coupon.value, description: coupon.description })
    }

    /// Returns false when the coupon was already used by someone else.
    pub async fn mark_used(&self, coupon_id: Uuid, order_id: Uuid) -> Result<bool> {
        let marked = self.repos.coupons.mark_coupon_used(coupon_id, order_id).await?;
        if !marked {
            tracing::warn!(coupon_id = %coupon_id, order_id = %order_id, "coupon was already used");
        }
        Ok(marked)
    }
}
