//! Transactional email through the EmailJS REST API.

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::IntegrationError;
use crate::config::EmailJsConfig;
use crate::domain::aggregates::ShippingAddress;
use crate::domain::value_objects::Money;

const EMAILJS_SEND_URL: &str = "https://api.emailjs.com/api/v1.0/email/send";

/// Line shown in an email and carried inside reminder payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailItem {
    pub name: String,
    pub quantity: u32,
    pub price: Money,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub items: Vec<EmailItem>,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

/// Order snapshot carried by a scheduled payment reminder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderDetails {
    pub id: String,
    pub total: Money,
    pub subtotal: Money,
    pub coupon_discount: Money,
    pub customer_name: String,
    pub items: Vec<EmailItem>,
    pub reminder_number: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_order_confirmation(&self, to: &str, order: &OrderConfirmation) -> Result<(), IntegrationError>;
    async fn send_payment_reminder(&self, to: &str, details: &ReminderDetails) -> Result<(), IntegrationError>;
    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), IntegrationError>;
}

#[derive(Debug, Clone)]
pub struct EmailJsClient {
    http: Client,
    config: Option<EmailJsConfig>,
    endpoint: String,
}

impl EmailJsClient {
    /// Without configuration every send is skipped with a warning.
    pub fn new(config: Option<EmailJsConfig>) -> Self {
        if config.is_none() {
            tracing::warn!("EmailJS not configured, emails will be skipped");
        }
        Self { http: Client::new(), config, endpoint: EMAILJS_SEND_URL.to_string() }
    }

    pub fn disabled() -> Self { Self { http: Client::new(), config: None, endpoint: EMAILJS_SEND_URL.to_string() } }

    async fn send(&self, config: &EmailJsConfig, template_id: &str, to: &str, params: serde_json::Value) -> Result<(), IntegrationError> {
        let body = json!({
            "service_id": config.service_id,
            "template_id": template_id,
            "user_id": config.public_key,
            "accessToken": config.access_token.clone().unwrap_or_default(),
            "template_params": params,
        });

        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(IntegrationError::rejected("emailjs", format!("status {status}: {text}")));
        }
        if text != "OK" {
            return Err(IntegrationError::rejected("emailjs", format!("unexpected response: {text}")));
        }
        tracing::info!(to, template_id, "email sent");
        Ok(())
    }
}

#[async_trait]
impl EmailSender for EmailJsClient {
    async fn send_order_confirmation(&self, to: &str, order: &OrderConfirmation) -> Result<(), IntegrationError> {
        let Some(config) = &self.config else {
            tracing::warn!(to, order_id = %order.order_id, "EmailJS not configured, skipping order confirmation");
            return Ok(());
        };
        let params = confirmation_params(to, order);
        self.send(config, &config.order_template_id, to, params).await
    }

    async fn send_payment_reminder(&self, to: &str, details: &ReminderDetails) -> Result<(), IntegrationError> {
        let Some(config) = &self.config else {
            tracing::warn!(to, order_id = %details.id, "EmailJS not configured, skipping payment reminder");
            return Ok(());
        };
        let template = config.reminder_template_id.as_deref().unwrap_or(&config.order_template_id);
        self.send(config, template, to, reminder_params(to, details)).await
    }

    async fn send_verification_code(&self, to: &str, code: &str) -> Result<(), IntegrationError> {
        let Some((config, template)) = self.config.as_ref().and_then(|c| c.verification_template_id.as_deref().map(|t| (c, t))) else {
            tracing::warn!(to, "verification email template not configured, skipping");
            return Ok(());
        };
        let params = json!({
            "to_email": to,
            "code": code,
            "expires_in_minutes": 10,
            "subject": "Your verification code",
        });
        self.send(config, template, to, params).await
    }
}

fn split_name(full: &str) -> (String, String) {
    let mut parts = full.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    (first, parts.collect::<Vec<_>>().join(" "))
}

fn confirmation_params(to: &str, order: &OrderConfirmation) -> serde_json::Value {
    let (first_name, last_name) = split_name(&order.customer_name);
    let address = order.shipping_address.clone().unwrap_or_default();
    let now = Utc::now();
    json!({
        "to_email": to,
        "first_name": first_name,
        "last_name": last_name,
        "order_number": order.order_id,
        "order_date": now.format("%A, %-d %B %Y").to_string(),
        "currency": "AUD",
        "total": order.total.to_string(),
        "subtotal": order.subtotal.to_string(),
        "discount": order.discount.to_string(),
        "shipping": Money::ZERO.to_string(),
        "item_count": order.items.iter().map(|i| i.quantity).sum::<u32>(),
        "items_html": items_html(&order.items),
        "customer_email": order.customer_email,
        "customer_phone": order.customer_phone.clone().unwrap_or_default(),
        "address1": address.address1.unwrap_or_default(),
        "address2": address.address2.unwrap_or_default(),
        "city": address.city.unwrap_or_default(),
        "state": address.state.unwrap_or_default(),
        "postcode": address.postcode.unwrap_or_default(),
        "country": address.country.unwrap_or_else(|| "Australia".to_string()),
        "year": now.year().to_string(),
        "subject": format!("Order Confirmation - Order #{}", order.order_id),
    })
}

fn reminder_params(to: &str, details: &ReminderDetails) -> serde_json::Value {
    let (first_name, last_name) = split_name(&details.customer_name);
    json!({
        "to_email": to,
        "first_name": first_name,
        "last_name": last_name,
        "order_number": details.id,
        "currency": "AUD",
        "total": details.total.to_string(),
        "subtotal": details.subtotal.to_string(),
        "discount": details.coupon_discount.to_string(),
        "item_count": details.items.iter().map(|i| i.quantity).sum::<u32>(),
        "items_html": items_html(&details.items),
        "reminder_number": details.reminder_number,
        "year": Utc::now().year().to_string(),
        "subject": format!("Payment Reminder - Order #{}", details.id),
    })
}

fn items_html(items: &[EmailItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let border = if index + 1 == items.len() { "border-bottom:0;" } else { "border-bottom:1px solid #e5e7eb;" };
            format!(
                r#"<tr><td valign="top" style="padding:14px;{border}vertical-align:top;"><div style="font-size:14px;color:#111827;font-weight:600;">{name}</div><div style="margin-top:4px;font-size:12px;color:#6b7280;">Quantity: {qty}</div></td><td valign="top" align="right" style="padding:14px;{border}font-size:14px;color:#111827;font-weight:600;white-space:nowrap;">${price}</td></tr>"#,
                name = escape_html(&item.name),
                qty = item.quantity,
                price = item.price,
            )
        })
        .collect()
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
