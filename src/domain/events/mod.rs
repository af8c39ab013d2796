//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::OrderStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
}

impl DomainEvent {
    /// Subject suffix used when broadcasting the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Created { .. }) => "orders.created",
            Self::Order(OrderEvent::StatusChanged { .. }) => "orders.status_changed",
            Self::Order(OrderEvent::Canceled { .. }) => "orders.canceled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: String, customer_id: Uuid, total: Decimal },
    StatusChanged { order_id: String, from: OrderStatus, to: OrderStatus },
    Canceled { order_id: String },
}
