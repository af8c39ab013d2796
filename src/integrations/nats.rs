//! Order events broadcast on NATS.

use crate::domain::events::DomainEvent;

const SUBJECT_PREFIX: &str = "storefront";

#[derive(Clone, Default)]
pub struct EventBus {
    client: Option<async_nats::Client>,
}

impl EventBus {
    pub fn new(client: Option<async_nats::Client>) -> Self { Self { client } }

    pub fn disabled() -> Self { Self::default() }

    /// Connects when a URL is given; connection failures leave the bus disabled.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::disabled() };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(url, "connected to NATS");
                Self::new(Some(client))
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "NATS unavailable, events will not be published");
                Self::disabled()
            }
        }
    }

    pub fn subject(event: &DomainEvent) -> String { format!("{SUBJECT_PREFIX}.{}", event.kind()) }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.client else { return };
        for event in events {
            let subject = Self::subject(&event);
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(subject = %subject, error = %e, "failed to encode event");
                    continue;
                }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(subject = %subject, error = %e, "failed to publish event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OrderEvent;

    #[test]
    fn test_subjects() {
        let event = DomainEvent::Order(OrderEvent::Canceled { order_id: "ab12cd34".into() });
        assert_eq!(EventBus::subject(&event), "storefront.orders.canceled");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "canceled");
        assert_eq!(json["order_id"], "ab12cd34");
    }

    #[tokio::test]
    async fn test_disabled_bus_is_silent() {
        let event = DomainEvent::Order(OrderEvent::Canceled { order_id: "x".into() });
        EventBus::disabled().publish_all(vec![event]).await;
    }
}
