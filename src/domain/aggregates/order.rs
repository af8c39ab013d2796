//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::domain::discounts::DiscountBreakdown;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, PublicCode};
use super::referral::DiscountType;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Paid, Shipped, Canceled, Refunded }

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [Self::Pending, Self::Paid, Self::Shipped, Self::Canceled, Self::Refunded];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Paid => "paid", Self::Shipped => "shipped",
            Self::Canceled => "canceled", Self::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> { Self::ALL.into_iter().find(|s| s.as_str() == value) }

    /// Statuses that count toward revenue.
    pub fn is_settled(&self) -> bool { matches!(self, Self::Paid | Self::Shipped) }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Line captured at order time, independent of later product edits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub price: Money,
    pub qty: u32,
    pub image_url: Option<String>,
}

impl OrderItem {
    pub fn line_total(&self) -> Money { self.price.multiply(self.qty) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingSnapshot {
    pub shipping_name: Option<String>,
    pub shipping_address1: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_postcode: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralUsage {
    pub referral_code_used: String,
    pub referral_owner_customer_id: Uuid,
    pub referral_program_id: Uuid,
    pub referral_discount_type: DiscountType,
    pub referral_discount_value: Decimal,
    pub referral_discount: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponUsage {
    pub coupon_id: Uuid,
    pub code: String,
    pub value: Money,
    pub discount: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    /// Public 8-hex identifier shown to customers.
    pub order_id: PublicCode,
    pub customer_id: Uuid,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub discount_amount: Money,
    pub coupon_discount: Money,
    pub total: Money,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub shipping: ShippingSnapshot,
    pub referral: Option<ReferralUsage>,
    pub coupons_used: Vec<CouponUsage>,
    pub reminder_message_ids: Vec<String>,
    pub shipping_carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl Order {
    pub fn place(
        order_id: PublicCode,
        customer_id: Uuid,
        items: Vec<OrderItem>,
        pricing: &DiscountBreakdown,
        shipping: ShippingSnapshot,
        referral: Option<ReferralUsage>,
        coupons_used: Vec<CouponUsage>,
    ) -> Self {
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), order_id, customer_id, items,
            subtotal: pricing.subtotal, discount_amount: pricing.discount_amount,
            coupon_discount: pricing.coupon_total, total: pricing.total,
            status: OrderStatus::Pending, shipping, referral, coupons_used,
            reminder_message_ids: vec![], shipping_carrier: None, tracking_number: None,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created {
            order_id: order.order_id.to_string(), customer_id: order.customer_id, total: order.total.amount(),
        }));
        order
    }

    pub fn item_count(&self) -> u32 { self.items.iter().map(|i| i.qty).sum() }

    /// Admin overwrite. Returns the reminder handles that must now be cancelled.
    pub fn set_status(&mut self, status: OrderStatus) -> Vec<String> {
        let from = self.status;
        self.status = status;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.order_id.to_string(), from, to: status }));
        if matches!(status, OrderStatus::Paid | OrderStatus::Shipped) {
            std::mem::take(&mut self.reminder_message_ids)
        } else {
            vec![]
        }
    }

    /// Customer cancel, only from pending. Returns the reminder handles to cancel.
    pub fn cancel_by_customer(&mut self) -> Result<Vec<String>, OrderError> {
        if self.status != OrderStatus::Pending { return Err(OrderError::NotPending); }
        self.status = OrderStatus::Canceled;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::Canceled { order_id: self.order_id.to_string() }));
        Ok(std::mem::take(&mut self.reminder_message_ids))
    }

    pub fn update_shipment(&mut self, carrier: Option<String>, tracking_number: Option<String>) {
        if carrier.is_some() { self.shipping_carrier = carrier; }
        if tracking_number.is_some() { self.tracking_number = tracking_number; }
        self.touch();
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum OrderError { NotPending }
impl std::error::Error for OrderError {}
impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Only pending orders can be canceled") }
}

impl From<OrderError> for crate::error::EcommerceError {
    fn from(_: OrderError) -> Self { Self::OrderNotCancellable }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::discounts;

    fn order() -> Order {
        let items = vec![OrderItem { product_id: Uuid::now_v7(), name: "Widget".into(), price: Money::from_cents(1000), qty: 2, image_url: None }];
        let pricing = discounts::compose(Money::from_cents(2000), None, &[]);
        Order::place(PublicCode::random_lower(), Uuid::now_v7(), items, &pricing, ShippingSnapshot::default(), None, vec![])
    }

    #[test]
    fn test_order_workflow() {
        let mut order = order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total, Money::from_cents(2000));
        order.reminder_message_ids = vec!["msg_1".into(), "msg_2".into()];
        assert_eq!(order.set_status(OrderStatus::Paid), vec!["msg_1".to_string(), "msg_2".to_string()]);
        assert!(order.reminder_message_ids.is_empty());
        assert_eq!(order.cancel_by_customer(), Err(OrderError::NotPending));
        assert_eq!(order.take_events().len(), 2);
    }

    #[test]
    fn test_customer_cancel_from_pending() {
        let mut order = order();
        order.reminder_message_ids = vec!["msg_9".into()];
        assert_eq!(order.cancel_by_customer().unwrap(), vec!["msg_9".to_string()]);
        assert_eq!(order.status, OrderStatus::Canceled);
    }

    #[test]
    fn test_refund_keeps_reminder_handles() {
        let mut order = order();
        order.reminder_message_ids = vec!["msg_1".into()];
        assert!(order.set_status(OrderStatus::Refunded).is_empty());
        assert_eq!(order.reminder_message_ids.len(), 1);
    }

    #[test]
    fn test_status_parse_and_shipment() {
        assert_eq!(OrderStatus::parse("shipped"), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("cancelled"), None);
        let mut order = order();
        order.update_shipment(Some("AusPost".into()), None);
        order.update_shipment(None, Some("TRK1".into()));
        assert_eq!(order.shipping_carrier.as_deref(), Some("AusPost"));
        assert_eq!(order.tracking_number.as_deref(), Some("TRK1"));
        assert_eq!(order.status, OrderStatus::Pending);
    }
}
