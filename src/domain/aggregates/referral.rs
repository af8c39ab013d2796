//! Referral Program Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percent,
    Amount,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Percent => "percent", Self::Amount => "amount" }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value { "percent" => Some(Self::Percent), "amount" => Some(Self::Amount), _ => None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralProgram {
    pub id: Uuid,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReferralProgram {
    pub fn create(name: impl Into<String>, discount_type: DiscountType, discount_value: Decimal, active: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into().trim().to_string(), discount_type,
            discount_value: clamp_value(discount_type, discount_value), active, created_at: now, updated_at: now,
        }
    }

    pub fn set_discount(&mut self, discount_type: DiscountType, value: Decimal) {
        self.discount_type = discount_type;
        self.discount_value = clamp_value(discount_type, value);
        self.updated_at = Utc::now();
    }

    /// Value used for pricing: percentages clamp to 0..=100, fixed amounts floor at 0.
    pub fn effective_value(&self) -> Decimal { clamp_value(self.discount_type, self.discount_value) }
}

fn clamp_value(discount_type: DiscountType, value: Decimal) -> Decimal {
    match discount_type {
        DiscountType::Percent => value.max(Decimal::ZERO).min(Decimal::ONE_HUNDRED),
        DiscountType::Amount => value.max(Decimal::ZERO),
    }
}
