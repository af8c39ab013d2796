//! Payment reminders: scheduling through delayed dispatch and delivery from the webhook.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{Customer, Order, OrderStatus};
use crate::error::{EcommerceError, Result};
use crate::integrations::{DelayedDispatch, EmailItem, EmailSender, ReminderDetails};
use crate::store::Repositories;

pub const PAYMENT_REMINDER: &str = "payment_reminder";
pub const WEBHOOK_PATH: &str = "/webhooks/qstash/email";

/// Body scheduled with the dispatcher and received back on the webhook.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub email: String,
    pub order_details: ReminderDetails,
}

impl ReminderPayload {
    pub fn for_order(order: &Order, customer: &Customer, reminder_number: u32) -> Self {
        Self {
            kind: PAYMENT_REMINDER.to_string(),
            email: customer.email.to_string(),
            order_details: ReminderDetails {
                id: order.order_id.to_string(),
                total: order.total,
                subtotal: order.subtotal,
                coupon_discount: order.coupon_discount,
                customer_name: customer.display_name(),
                items: order.items.iter().map(|i| EmailItem { name: i.name.clone(), quantity: i.qty, price: i.price }).collect(),
                reminder_number,
            },
        }
    }
}

/// Webhook reply. Skips still report success so the dispatcher stops retrying.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DeliveryAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl DeliveryAck {
    fn sent() -> Self { Self { success: true, skipped: None, reason: None } }
    fn skipped(reason: &'static str) -> Self { Self { success: true, skipped: Some(true), reason: Some(reason) } }
}

#[derive(Clone)]
pub struct ReminderService {
    repos: Repositories,
    dispatcher: Arc<dyn DelayedDispatch>,
    email: Arc<dyn EmailSender>,
    webhook_url: Option<String>,
    delays: Vec<Duration>,
}

impl ReminderService {
    /// Without `app_base_url` nothing is scheduled.
    pub fn new(
        repos: Repositories,
        dispatcher: Arc<dyn DelayedDispatch>,
        email: Arc<dyn EmailSender>,
        app_base_url: Option<&str>,
        delays_secs: &[u64],
    ) -> Self {
        Self {
            repos,
            dispatcher,
            email,
            webhook_url: app_base_url.map(|base| format!("{}{WEBHOOK_PATH}", base.trim_end_matches('/'))),
            delays: delays_secs.iter().copied().map(Duration::from_secs).collect(),
        }
    }

    /// Schedules one reminder per delay, numbered from 2 since the confirmation is the first.
    /// Returns the handles that were obtained.
    pub async fn schedule(&self, order: &Order, customer: &Customer) -> Vec<String> {
        let Some(url) = &self.webhook_url else {
            tracing::warn!(order_id = %order.order_id, "APP_BASE_URL not configured, reminders not scheduled");
            return vec![];
        };

        let mut handles = Vec::with_capacity(self.delays.len());
        for (index, delay) in self.delays.iter().enumerate() {
            let number = u32::try_from(index).unwrap_or(u32::MAX).saturating_add(2);
            let payload = match serde_json::to_value(ReminderPayload::for_order(order, customer, number)) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(order_id = %order.order_id, error = %e, "failed to encode reminder payload");
                    continue;
                }
            };
            match self.dispatcher.publish(url, payload, *delay).await {
                Ok(Some(handle)) => {
                    tracing::info!(order_id = %order.order_id, reminder = number, delay_secs = delay.as_secs(), "payment reminder scheduled");
                    handles.push(handle);
                }
                Ok(None) => {}
                Err(e) => tracing::error!(order_id = %order.order_id, reminder = number, error = %e, "failed to schedule payment reminder"),
            }
        }
        handles
    }

    /// Already-delivered or unknown handles only produce a warning.
    pub async fn cancel(&self, handles: &[String]) {
        for handle in handles {
            if let Err(e) = self.dispatcher.cancel(handle).await {
                tracing::warn!(handle = %handle, error = %e, "failed to cancel reminder");
            }
        }
    }

    /// Re-checks the order before mailing; a send failure surfaces so the dispatcher retries.
    pub async fn deliver(&self, payload: ReminderPayload) -> Result<DeliveryAck> {
        if payload.kind != PAYMENT_REMINDER {
            tracing::info!(kind = %payload.kind, "ignoring webhook of unknown type");
            return Ok(DeliveryAck::sent());
        }
        let details = &payload.order_details;
        let Some(order) = self.repos.orders.find_order_by_public_id(&details.id).await? else {
            tracing::warn!(order_id = %details.id, "order not found, skipping reminder");
            return Ok(DeliveryAck::skipped("order_not_found"));
        };
        if order.status != OrderStatus::Pending {
            tracing::info!(order_id = %details.id, status = %order.status, reminder = details.reminder_number, "order no longer pending, skipping reminder");
            return Ok(DeliveryAck::skipped("order_not_pending"));
        }

        self.email.send_payment_reminder(&payload.email, details).await.map_err(|e| {
            tracing::error!(order_id = %details.id, error = %e, "failed to send payment reminder");
            EcommerceError::from(e)
        })?;
        tracing::info!(order_id = %details.id, reminder = details.reminder_number, "payment reminder sent");
        Ok(DeliveryAck::sent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderItem, ShippingSnapshot};
    use crate::domain::discounts;
    use crate::domain::value_objects::{EmailAddress, Money, PublicCode};
    use crate::integrations::emailjs::MockEmailSender;
    use crate::integrations::qstash::MockDelayedDispatch;
    use crate::integrations::IntegrationError;
    use uuid::Uuid;

    fn customer() -> Customer {
        let mut c = Customer::register(EmailAddress::parse("jo@shop.io").unwrap(), "h".into(), PublicCode::random_upper());
        c.first_name = Some("Jo".into());
        c
    }

    fn order(customer: &Customer) -> Order {
        let items = vec![OrderItem { product_id: Uuid::now_v7(), name: "Mints".into(), price: Money::from_cents(250), qty: 2, image_url: None }];
        let pricing = discounts::compose(Money::from_cents(500), None, &[]);
        Order::place(PublicCode::random_lower(), customer.id, items, &pricing, ShippingSnapshot::default(), None, vec![])
    }

    #[tokio::test]
    async fn test_schedule_numbers_reminders_from_two() {
        let mut dispatcher = MockDelayedDispatch::new();
        dispatcher
            .expect_publish()
            .withf(|url, payload, _| url == "https://shop.test/webhooks/qstash/email" && payload["type"] == "payment_reminder")
            .times(2)
            .returning(|_, payload, delay| Ok(Some(format!("msg_{}_{}", payload["orderDetails"]["reminderNumber"], delay.as_secs()))));

        let service = ReminderService::new(
            Repositories::in_memory(), Arc::new(dispatcher), Arc::new(MockEmailSender::new()),
            Some("https://shop.test/"), &[86_400, 172_800],
        );
        let customer = customer();
        let handles = service.schedule(&order(&customer), &customer).await;
        assert_eq!(handles, vec!["msg_2_86400".to_string(), "msg_3_172800".to_string()]);
    }

    #[tokio::test]
    async fn test_schedule_failures_are_swallowed() {
        let mut dispatcher = MockDelayedDispatch::new();
        let mut calls = 0;
        dispatcher.expect_publish().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 { Err(IntegrationError::rejected("qstash", "boom")) } else { Ok(Some("msg_ok".into())) }
        });
        let service = ReminderService::new(
            Repositories::in_memory(), Arc::new(dispatcher), Arc::new(MockEmailSender::new()),
            Some("https://shop.test"), &[1, 2],
        );
        let customer = customer();
        assert_eq!(service.schedule(&order(&customer), &customer).await, vec!["msg_ok".to_string()]);
    }

    #[tokio::test]
    async fn test_deliver_rechecks_order_status() {
        let repos = Repositories::in_memory();
        let customer = customer();
        let mut order = order(&customer);
        repos.orders.insert_order(&order).await.unwrap();

        let mut email = MockEmailSender::new();
        email.expect_send_payment_reminder().withf(|to, _| to == "jo@shop.io").times(1).returning(|_, _| Ok(()));
        let service = ReminderService::new(repos.clone(), Arc::new(MockDelayedDispatch::new()), Arc::new(email), None, &[]);

        let payload = ReminderPayload::for_order(&order, &customer, 2);
        assert_eq!(service.deliver(payload.clone()).await.unwrap(), DeliveryAck::sent());

        order.set_status(OrderStatus::Paid);
        repos.orders.update_order(&order).await.unwrap();
        assert_eq!(service.deliver(payload.clone()).await.unwrap().reason, Some("order_not_pending"));

        let mut missing = payload;
        missing.order_details.id = "00000000".into();
        assert_eq!(service.deliver(missing).await.unwrap().reason, Some("order_not_found"));
    }

    #[tokio::test]
    async fn test_deliver_send_failure_is_upstream_error() {
        let repos = Repositories::in_memory();
        let customer = customer();
        let order = order(&customer);
        repos.orders.insert_order(&order).await.unwrap();

        let mut email = MockEmailSender::new();
        email.expect_send_payment_reminder().returning(|_, _| Err(IntegrationError::rejected("emailjs", "down")));
        let service = ReminderService::new(repos, Arc::new(MockDelayedDispatch::new()), Arc::new(email), None, &[]);

        let err = service.deliver(ReminderPayload::for_order(&order, &customer, 3)).await.unwrap_err();
        assert!(matches!(err, EcommerceError::Upstream(_)));
    }
}
