//! Order placement and lifecycle.
//!
//! Placement validates the basket against current stock, prices it with the
//! referral program and up to three coupons, then decrements stock one item at a
//! time with a conditional update. Earlier decrements are not rolled back when a
//! later item runs out. Everything after the order row is written (coupon
//! redemption, confirmation email, reminder scheduling, events) is best-effort.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::coupons::CouponService;
use super::referrals::ReferralService;
use super::reminders::ReminderService;
use crate::domain::aggregates::{
    Basket, CouponUsage, Customer, Order, OrderItem, OrderStatus, ReferralUsage, ShippingAddress,
    ShippingSnapshot,
};
use crate::domain::discounts::{self, CouponInput};
use crate::domain::value_objects::{Money, PublicCode};
use crate::error::{EcommerceError, Result};
use crate::integrations::{EmailItem, EmailSender, EventBus, OrderConfirmation};
use crate::store::Repositories;

pub const MAX_COUPONS_PER_ORDER: usize = 3;
const ORDER_ID_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub qty: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    #[serde(default)]
    pub items: Vec<OrderLineRequest>,
    pub shipping_name: Option<String>,
    pub shipping_address1: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_postcode: Option<String>,
    pub referral_code: Option<String>,
    pub coupon_codes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentUpdate {
    pub shipping_carrier: Option<String>,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

impl From<&Customer> for CustomerInfo {
    fn from(c: &Customer) -> Self {
        Self {
            id: c.id,
            email: c.email.to_string(),
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
            phone: c.phone.clone(),
            shipping_address: c.shipping_address.clone(),
        }
    }
}

/// Order as listed for admins, with its customer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithCustomer {
    #[serde(flatten)]
    pub order: Order,
    pub customer_email: Option<String>,
    pub customer_info: Option<CustomerInfo>,
}

impl OrderWithCustomer {
    fn new(order: Order, customer: Option<&Customer>) -> Self {
        Self {
            customer_email: customer.map(|c| c.email.to_string()),
            customer_info: customer.map(CustomerInfo::from),
            order,
        }
    }
}

impl NewOrder {
    fn shipping(&self) -> ShippingSnapshot {
        ShippingSnapshot {
            shipping_name: self.shipping_name.clone(),
            shipping_address1: self.shipping_address1.clone(),
            shipping_city: self.shipping_city.clone(),
            shipping_state: self.shipping_state.clone(),
            shipping_postcode: self.shipping_postcode.clone(),
        }
    }

    /// Normalised coupon codes; blank entries are dropped.
    fn coupon_codes(&self) -> Result<Vec<PublicCode>> {
        let codes: Vec<PublicCode> = self
            .coupon_codes
            .iter()
            .flatten()
            .filter_map(|raw| PublicCode::normalize(raw))
            .collect();
        if codes.len() > MAX_COUPONS_PER_ORDER {
            return Err(EcommerceError::validation(format!(
                "At most {MAX_COUPONS_PER_ORDER} coupons can be applied to an order"
            )));
        }
        let unique: HashSet<&str> = codes.iter().map(PublicCode::as_str).collect();
        if unique.len() != codes.len() {
            return Err(EcommerceError::validation("Duplicate coupon codes are not allowed"));
        }
        Ok(codes)
    }
}

fn shipping_address(snapshot: &ShippingSnapshot, customer: &Customer) -> Option<ShippingAddress> {
    let has_snapshot = snapshot.shipping_name.is_some()
        || snapshot.shipping_address1.is_some()
        || snapshot.shipping_city.is_some();
    if !has_snapshot {
        return customer.shipping_address.clone();
    }
    Some(ShippingAddress {
        full_name: snapshot.shipping_name.clone(),
        phone: customer.phone.clone(),
        address1: snapshot.shipping_address1.clone(),
        city: snapshot.shipping_city.clone(),
        state: snapshot.shipping_state.clone(),
        postcode: snapshot.shipping_postcode.clone(),
        ..ShippingAddress::default()
    })
}

#[derive(Clone)]
pub struct OrderService {
    repos: Repositories,
    referrals: ReferralService,
    coupons: CouponService,
    reminders: ReminderService,
    email: Arc<dyn EmailSender>,
    events: EventBus,
}

impl OrderService {
    pub fn new(
        repos: Repositories,
        referrals: ReferralService,
        coupons: CouponService,
        reminders: ReminderService,
        email: Arc<dyn EmailSender>,
        events: EventBus,
    ) -> Self {
        Self { repos, referrals, coupons, reminders, email, events }
    }

    pub async fn create(&self, customer_id: Uuid, input: NewOrder) -> Result<Order> {
        if input.items.is_empty() {
            return Err(EcommerceError::validation("Order must include at least 1 item"));
        }
        let customer = self
            .repos
            .customers
            .get_customer(customer_id)
            .await?
            .ok_or(EcommerceError::NotFound("Customer"))?;

        let basket = Basket::from_requests(input.items.iter().map(|l| (l.product_id, l.qty)))
            .map_err(|e| EcommerceError::validation(e.to_string()))?;
        let requested = basket.product_ids();
        let products = self.repos.products.get_products(&requested).await?;
        if products.len() != requested.len() {
            return Err(EcommerceError::validation("One or more products do not exist"));
        }

        let mut items = Vec::with_capacity(basket.lines().len());
        for line in basket.lines() {
            let product = products
                .iter()
                .find(|p| p.id == line.product_id)
                .ok_or_else(|| EcommerceError::validation("One or more products do not exist"))?;
            let qty = line.quantity.value();
            if !product.has_stock(qty) {
                return Err(EcommerceError::InsufficientStock(product.name.clone()));
            }
            items.push(OrderItem {
                product_id: product.id,
                name: product.name.clone(),
                price: product.price,
                qty,
                image_url: product.image_url.clone(),
            });
        }
        let subtotal = items.iter().map(OrderItem::line_total).sum::<Money>().round();

        let referral = match input.referral_code.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(raw) => Some(self.referrals.resolve_code(raw).await?),
            None => None,
        };

        let mut coupon_inputs = Vec::new();
        for code in input.coupon_codes()? {
            let coupon = self.coupons.validate(code.as_str(), customer_id).await?;
            coupon_inputs.push(CouponInput {
                coupon_id: coupon.id,
                code: coupon.code.into_string(),
                value: coupon.value,
            });
        }

        let program = referral.as_ref().map(|(_, program)| program);
        let pricing = discounts::compose(subtotal, program, &coupon_inputs);
        let referral_usage = referral.map(|(owner, program)| ReferralUsage {
            referral_code_used: owner.referral_code().map(ToString::to_string).unwrap_or_default(),
            referral_owner_customer_id: owner.id,
            referral_program_id: program.id,
            referral_discount_type: program.discount_type,
            referral_discount_value: program.effective_value(),
            referral_discount: pricing.referral,
        });
        let coupons_used: Vec<CouponUsage> = pricing
            .coupons
            .iter()
            .map(|c| CouponUsage {
                coupon_id: c.coupon_id,
                code: c.code.clone(),
                value: c.value,
                discount: c.discount,
            })
            .collect();

        let order_id = self.unique_order_id().await?;

        for item in &items {
            if !self.repos.products.decrement_stock(item.product_id, item.qty).await? {
                tracing::warn!(
                    product_id = %item.product_id,
                    order_id = %order_id,
                    "stock ran out during placement"
                );
                return Err(EcommerceError::InsufficientStock(item.name.clone()));
            }
        }

        let mut order = Order::place(
            order_id,
            customer_id,
            items,
            &pricing,
            input.shipping(),
            referral_usage,
            coupons_used,
        );
        self.repos.orders.insert_order(&order).await?;
        tracing::info!(
            order_id = %order.order_id,
            customer_id = %customer_id,
            subtotal = %order.subtotal,
            discount = %order.discount_amount,
            total = %order.total,
            "order placed"
        );

        self.after_placement(&mut order, &customer).await;
        Ok(order)
    }

    async fn after_placement(&self, order: &mut Order, customer: &Customer) {
        for usage in &order.coupons_used {
            if let Err(e) = self.coupons.mark_used(usage.coupon_id, order.id).await {
                tracing::error!(
                    coupon_id = %usage.coupon_id,
                    order_id = %order.order_id,
                    error = %e,
                    "failed to mark coupon used"
                );
            }
        }

        let confirmation = OrderConfirmation {
            order_id: order.order_id.to_string(),
            customer_name: customer.display_name(),
            customer_email: customer.email.to_string(),
            customer_phone: customer.phone.clone(),
            shipping_address: shipping_address(&order.shipping, customer),
            items: order
                .items
                .iter()
                .map(|i| EmailItem { name: i.name.clone(), quantity: i.qty, price: i.price })
                .collect(),
            subtotal: order.subtotal,
            discount: order.discount_amount,
            total: order.total,
        };
        let sent = self.email.send_order_confirmation(customer.email.as_str(), &confirmation).await;
        if let Err(e) = sent {
            tracing::error!(
                order_id = %order.order_id,
                error = %e,
                "failed to send order confirmation"
            );
        }

        let handles = self.reminders.schedule(order, customer).await;
        if !handles.is_empty() {
            match self.repos.orders.set_reminder_handles(order.id, &handles).await {
                Ok(()) => order.reminder_message_ids = handles,
                Err(e) => tracing::error!(
                    order_id = %order.order_id,
                    error = %e,
                    "failed to store reminder handles"
                ),
            }
        }

        self.events.publish_all(order.take_events()).await;
    }

    async fn unique_order_id(&self) -> Result<PublicCode> {
        for _ in 0..ORDER_ID_ATTEMPTS {
            let id = PublicCode::random_lower();
            if !self.repos.orders.order_id_taken(id.as_str()).await? {
                return Ok(id);
            }
        }
        Err(EcommerceError::validation("Failed to generate unique order id"))
    }

    pub async fn list_mine(&self, customer_id: Uuid) -> Result<Vec<Order>> {
        self.repos.orders.list_orders_for_customer(customer_id).await
    }

    /// Another customer's order reads as missing.
    pub async fn get_mine(&self, customer_id: Uuid, id: Uuid) -> Result<Order> {
        self.repos
            .orders
            .get_order(id)
            .await?
            .filter(|o| o.customer_id == customer_id)
            .ok_or(EcommerceError::NotFound("Order"))
    }

    pub async fn list_all(&self) -> Result<Vec<OrderWithCustomer>> {
        let orders = self.repos.orders.list_orders().await?;
        let customers = self.repos.customers.list_customers().await?;
        Ok(orders
            .into_iter()
            .map(|order| {
                let customer = customers.iter().find(|c| c.id == order.customer_id);
                OrderWithCustomer::new(order, customer)
            })
            .collect())
    }

    pub async fn list_by_referral_code(&self, raw: &str) -> Result<Vec<Order>> {
        match PublicCode::normalize(raw) {
            Some(code) => self.repos.orders.list_orders_by_referral_code(code.as_str()).await,
            None => Ok(vec![]),
        }
    }

    async fn enriched(&self, order: Order) -> Result<OrderWithCustomer> {
        let customer = self.repos.customers.get_customer(order.customer_id).await?;
        Ok(OrderWithCustomer::new(order, customer.as_ref()))
    }

    async fn get(&self, id: Uuid) -> Result<Order> {
        self.repos.orders.get_order(id).await?.ok_or(EcommerceError::NotFound("Order"))
    }

    /// Admin overwrite. Moving to paid or shipped withdraws the outstanding reminders.
    pub async fn update_status(&self, id: Uuid, status: OrderStatus) -> Result<OrderWithCustomer> {
        let mut order = self.get(id).await?;
        let from = order.status;
        let to_cancel = order.set_status(status);
        self.repos.orders.update_order(&order).await?;
        tracing::info!(
            order_id = %order.order_id,
            from = %from,
            to = %status,
            "order status updated"
        );

        if !to_cancel.is_empty() {
            self.reminders.cancel(&to_cancel).await;
        }
        self.events.publish_all(order.take_events()).await;
        self.enriched(order).await
    }

    pub async fn update_shipment(
        &self,
        id: Uuid,
        input: ShipmentUpdate,
    ) -> Result<OrderWithCustomer> {
        let mut order = self.get(id).await?;
        order.update_shipment(input.shipping_carrier, input.tracking_number);
        self.repos.orders.update_order(&order).await?;
        self.enriched(order).await
    }

    pub async fn cancel_mine(&self, customer_id: Uuid, id: Uuid) -> Result<Order> {
        let mut order = self.get_mine(customer_id, id).await?;
        let handles = order.cancel_by_customer()?;
        if !self.repos.orders.update_order_if_status(&order, OrderStatus::Pending).await? {
            return Err(EcommerceError::OrderNotCancellable);
        }
        tracing::info!(
            order_id = %order.order_id,
            customer_id = %customer_id,
            "order canceled by customer"
        );

        self.reminders.cancel(&handles).await;
        for item in &order.items {
            self.repos.products.restore_stock(item.product_id, item.qty).await?;
        }
        self.events.publish_all(order.take_events()).await;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Coupon, DiscountType, Product, ReferralProgram};
    use crate::domain::value_objects::EmailAddress;
    use crate::integrations::emailjs::MockEmailSender;
    use crate::integrations::qstash::MockDelayedDispatch;
    use crate::integrations::IntegrationError;
    use crate::store::{OrderStore, ProductQuery, ProductStore};
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    struct Fixture {
        repos: Repositories,
        service: OrderService,
        customer: Customer,
    }

    fn dispatcher() -> MockDelayedDispatch {
        let mut dispatcher = MockDelayedDispatch::new();
        let mut next = 0;
        dispatcher.expect_publish().returning(move |_, _, _| {
            next += 1;
            Ok(Some(format!("msg_{next}")))
        });
        dispatcher
    }

    async fn fixture_with(dispatcher: MockDelayedDispatch, email: MockEmailSender) -> Fixture {
        fixture_on(Repositories::in_memory(), dispatcher, email).await
    }

    async fn fixture_on(
        repos: Repositories,
        dispatcher: MockDelayedDispatch,
        email: MockEmailSender,
    ) -> Fixture {
        let email: Arc<dyn EmailSender> = Arc::new(email);
        let reminders = ReminderService::new(
            repos.clone(),
            Arc::new(dispatcher),
            email.clone(),
            Some("https://shop.test"),
            &[86_400, 172_800],
        );
        let service = OrderService::new(
            repos.clone(),
            ReferralService::new(repos.clone()),
            CouponService::new(repos.clone()),
            reminders,
            email,
            EventBus::disabled(),
        );
        let email = EmailAddress::parse("buyer@shop.io").unwrap();
        let customer = Customer::register(email, "h".into(), PublicCode::random_upper());
        repos.customers.insert_customer(&customer).await.unwrap();
        Fixture { repos, service, customer }
    }

    async fn fixture() -> Fixture {
        let mut email = MockEmailSender::new();
        email.expect_send_order_confirmation().returning(|_, _| Ok(()));
        fixture_with(dispatcher(), email).await
    }

    async fn product(repos: &Repositories, name: &str, cents: i64, stock: u32) -> Product {
        let product = Product::create(name, Money::from_cents(cents), stock);
        repos.products.insert_product(&product).await.unwrap();
        product
    }

    fn order_for(lines: &[(Uuid, i64)]) -> NewOrder {
        NewOrder {
            items: lines
                .iter()
                .map(|(product_id, qty)| OrderLineRequest { product_id: *product_id, qty: *qty })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_second_order_runs_out_of_stock() {
        let f = fixture().await;
        let p = product(&f.repos, "Mango", 300, 5).await;

        let order = f.service.create(f.customer.id, order_for(&[(p.id, 3)])).await.unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.reminder_message_ids.len(), 2);
        assert_eq!(f.repos.products.get_product(p.id).await.unwrap().unwrap().stock_qty, 2);

        let err = f.service.create(f.customer.id, order_for(&[(p.id, 3)])).await.unwrap_err();
        assert_eq!(err.to_string(), "Not enough stock for Mango");
        assert_eq!(f.repos.products.get_product(p.id).await.unwrap().unwrap().stock_qty, 2);
    }

    #[tokio::test]
    async fn test_input_validation_messages() {
        let f = fixture().await;
        let p = product(&f.repos, "Lime", 100, 5).await;
        let empty = f.service.create(f.customer.id, NewOrder::default()).await.unwrap_err();
        assert_eq!(empty.to_string(), "Order must include at least 1 item");
        let missing = order_for(&[(Uuid::now_v7(), 1)]);
        let unknown = f.service.create(f.customer.id, missing).await.unwrap_err();
        assert_eq!(unknown.to_string(), "One or more products do not exist");
        let zero = f.service.create(f.customer.id, order_for(&[(p.id, 0)])).await.unwrap_err();
        assert_eq!(zero.to_string(), "Invalid qty");
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_merged() {
        let f = fixture().await;
        let p = product(&f.repos, "Kiwi", 150, 10).await;
        let input = order_for(&[(p.id, 2), (p.id, 3)]);
        let order = f.service.create(f.customer.id, input).await.unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].qty, 5);
        assert_eq!(order.subtotal, Money::from_cents(750));
    }

    #[tokio::test]
    async fn test_ten_percent_referral() {
        let f = fixture().await;
        let p = product(&f.repos, "Hamper", 10_000, 3).await;
        let program = ReferralProgram::create("Friends", DiscountType::Percent, Decimal::TEN, true);
        f.repos.referrals.insert_program(&program).await.unwrap();
        let owner_email = EmailAddress::parse("owner@shop.io").unwrap();
        let owner_code = PublicCode::normalize("FEEDBEEF").unwrap();
        let mut owner = Customer::register(owner_email, "h".into(), owner_code);
        owner.referral_program_id = Some(program.id);
        f.repos.customers.insert_customer(&owner).await.unwrap();

        let mut input = order_for(&[(p.id, 1)]);
        input.referral_code = Some(" feedbeef ".into());
        let order = f.service.create(f.customer.id, input).await.unwrap();
        assert_eq!(order.discount_amount, Money::from_cents(1000));
        assert_eq!(order.total, Money::from_cents(9000));
        let usage = order.referral.unwrap();
        assert_eq!(usage.referral_code_used, "FEEDBEEF");
        assert_eq!(usage.referral_owner_customer_id, owner.id);
        assert_eq!(f.service.list_by_referral_code("feedbeef").await.unwrap().len(), 1);

        let mut bad = order_for(&[(p.id, 1)]);
        bad.referral_code = Some("00000000".into());
        let err = f.service.create(f.customer.id, bad).await;
        assert!(matches!(err, Err(EcommerceError::InvalidReferralCode)));
    }

    #[tokio::test]
    async fn test_coupons_stack_and_are_consumed() {
        let f = fixture().await;
        let p = product(&f.repos, "Box", 5_000, 3).await;
        let coupon = |cents| {
            let value = Money::from_cents(cents);
            Coupon::issue(PublicCode::random_upper(), f.customer.id, value, None, None)
        };
        let first = coupon(2000);
        let second = coupon(4000);
        f.repos.coupons.insert_coupon(&first).await.unwrap();
        f.repos.coupons.insert_coupon(&second).await.unwrap();

        let mut input = order_for(&[(p.id, 1)]);
        input.coupon_codes = Some(vec![first.code.to_string(), second.code.to_string()]);
        let order = f.service.create(f.customer.id, input.clone()).await.unwrap();
        assert_eq!(order.coupons_used[0].discount, Money::from_cents(2000));
        assert_eq!(order.coupons_used[1].discount, Money::from_cents(3000));
        assert_eq!(order.coupon_discount, Money::from_cents(5000));
        assert_eq!(order.total, Money::ZERO);

        let reused = f.repos.coupons.get_coupon(first.id).await.unwrap().unwrap();
        assert!(reused.is_used);
        assert_eq!(reused.used_in_order_id, Some(order.id));
        let err = f.service.create(f.customer.id, input).await.unwrap_err();
        assert_eq!(err.to_string(), "This coupon has already been used");
    }

    #[tokio::test]
    async fn test_coupon_count_and_duplicates_rejected() {
        let f = fixture().await;
        let p = product(&f.repos, "Box", 100, 3).await;
        let mut input = order_for(&[(p.id, 1)]);
        input.coupon_codes = Some(vec!["AAAAAAAA".into(), "aaaaaaaa".into()]);
        let err = f.service.create(f.customer.id, input.clone()).await.unwrap_err();
        assert_eq!(err.to_string(), "Duplicate coupon codes are not allowed");
        input.coupon_codes = Some(vec!["A1".into(), "A2".into(), "A3".into(), "A4".into()]);
        let err = f.service.create(f.customer.id, input).await;
        assert!(matches!(err, Err(EcommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_and_withdraws_reminders() {
        let mut dispatcher = dispatcher();
        dispatcher.expect_cancel().times(2).returning(|_| Ok(()));
        let mut email = MockEmailSender::new();
        email.expect_send_order_confirmation().returning(|_, _| Ok(()));
        let f = fixture_with(dispatcher, email).await;
        let p = product(&f.repos, "Plum", 200, 4).await;

        let order = f.service.create(f.customer.id, order_for(&[(p.id, 4)])).await.unwrap();
        assert_eq!(f.repos.products.get_product(p.id).await.unwrap().unwrap().stock_qty, 0);

        let canceled = f.service.cancel_mine(f.customer.id, order.id).await.unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        assert!(canceled.reminder_message_ids.is_empty());
        assert_eq!(f.repos.products.get_product(p.id).await.unwrap().unwrap().stock_qty, 4);

        let again = f.service.cancel_mine(f.customer.id, order.id).await.unwrap_err();
        assert_eq!(again.to_string(), "Only pending orders can be canceled");
        assert_eq!(f.repos.products.get_product(p.id).await.unwrap().unwrap().stock_qty, 4);
    }

    #[tokio::test]
    async fn test_orders_are_owner_scoped() {
        let f = fixture().await;
        let p = product(&f.repos, "Fig", 200, 4).await;
        let order = f.service.create(f.customer.id, order_for(&[(p.id, 1)])).await.unwrap();
        let stranger = Uuid::now_v7();
        let err = f.service.get_mine(stranger, order.id).await;
        assert!(matches!(err, Err(EcommerceError::NotFound("Order"))));
        assert!(f.service.cancel_mine(stranger, order.id).await.is_err());
        assert_eq!(f.service.list_mine(f.customer.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_paid_status_cancels_reminders() {
        let mut dispatcher = dispatcher();
        dispatcher
            .expect_cancel()
            .withf(|handle| handle.starts_with("msg_"))
            .times(2)
            .returning(|_| Ok(()));
        let mut email = MockEmailSender::new();
        email.expect_send_order_confirmation().returning(|_, _| Ok(()));
        let f = fixture_with(dispatcher, email).await;
        let p = product(&f.repos, "Pear", 200, 4).await;
        let order = f.service.create(f.customer.id, order_for(&[(p.id, 1)])).await.unwrap();

        let updated = f.service.update_status(order.id, OrderStatus::Paid).await.unwrap();
        assert_eq!(updated.order.status, OrderStatus::Paid);
        assert!(updated.order.reminder_message_ids.is_empty());
        assert_eq!(updated.customer_email.as_deref(), Some("buyer@shop.io"));

        let shipment = ShipmentUpdate { tracking_number: Some("TRK".into()), ..Default::default() };
        let shipped = f.service.update_shipment(order.id, shipment).await.unwrap();
        assert_eq!(shipped.order.status, OrderStatus::Paid);
        assert_eq!(shipped.order.tracking_number.as_deref(), Some("TRK"));
    }

    #[tokio::test]
    async fn test_email_failure_does_not_fail_order() {
        let mut email = MockEmailSender::new();
        email
            .expect_send_order_confirmation()
            .returning(|_, _| Err(IntegrationError::rejected("emailjs", "down")));
        let f = fixture_with(dispatcher(), email).await;
        let p = product(&f.repos, "Date", 200, 4).await;
        assert!(f.service.create(f.customer.id, order_for(&[(p.id, 1)])).await.is_ok());
        let listed = f.service.list_all().await.unwrap();
        let info = listed[0].customer_info.as_ref();
        assert_eq!(info.map(|c| c.email.as_str()), Some("buyer@shop.io"));
    }

    /// Product store whose conditional decrement always loses for one product.
    struct ContendedStock {
        inner: Arc<dyn ProductStore>,
        contended: Uuid,
    }

    #[async_trait]
    impl ProductStore for ContendedStock {
        async fn insert_product(&self, product: &Product) -> Result<()> {
            self.inner.insert_product(product).await
        }
        async fn update_product(&self, product: &Product) -> Result<()> {
            self.inner.update_product(product).await
        }
        async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
            self.inner.get_product(id).await
        }
        async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
            self.inner.get_products(ids).await
        }
        async fn search_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)> {
            self.inner.search_products(query).await
        }
        async fn list_products(&self) -> Result<Vec<Product>> {
            self.inner.list_products().await
        }
        async fn delete_product(&self, id: Uuid) -> Result<bool> {
            self.inner.delete_product(id).await
        }
        async fn decrement_stock(&self, id: Uuid, qty: u32) -> Result<bool> {
            if id == self.contended {
                return Ok(false);
            }
            self.inner.decrement_stock(id, qty).await
        }
        async fn restore_stock(&self, id: Uuid, qty: u32) -> Result<()> {
            self.inner.restore_stock(id, qty).await
        }
    }

    /// Order store that reports every public id as already taken.
    struct ExhaustedOrderIds {
        inner: Arc<dyn OrderStore>,
    }

    #[async_trait]
    impl OrderStore for ExhaustedOrderIds {
        async fn insert_order(&self, order: &Order) -> Result<()> {
            self.inner.insert_order(order).await
        }
        async fn order_id_taken(&self, _order_id: &str) -> Result<bool> {
            Ok(true)
        }
        async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
            self.inner.get_order(id).await
        }
        async fn find_order_by_public_id(&self, order_id: &str) -> Result<Option<Order>> {
            self.inner.find_order_by_public_id(order_id).await
        }
        async fn list_orders(&self) -> Result<Vec<Order>> {
            self.inner.list_orders().await
        }
        async fn list_orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>> {
            self.inner.list_orders_for_customer(customer_id).await
        }
        async fn list_orders_by_referral_code(&self, code: &str) -> Result<Vec<Order>> {
            self.inner.list_orders_by_referral_code(code).await
        }
        async fn update_order(&self, order: &Order) -> Result<()> {
            self.inner.update_order(order).await
        }
        async fn update_order_if_status(
            &self,
            order: &Order,
            expected: OrderStatus,
        ) -> Result<bool> {
            self.inner.update_order_if_status(order, expected).await
        }
        async fn set_reminder_handles(&self, id: Uuid, handles: &[String]) -> Result<()> {
            self.inner.set_reminder_handles(id, handles).await
        }
    }

    fn quiet_email() -> MockEmailSender {
        let mut email = MockEmailSender::new();
        email.expect_send_order_confirmation().returning(|_, _| Ok(()));
        email
    }

    #[tokio::test]
    async fn test_lost_decrement_keeps_earlier_items_decremented() {
        let mut repos = Repositories::in_memory();
        let a = product(&repos, "A", 100, 5).await;
        let b = product(&repos, "B", 100, 5).await;
        let inner = repos.products.clone();
        repos.products = Arc::new(ContendedStock { inner, contended: b.id });
        let f = fixture_on(repos, dispatcher(), quiet_email()).await;

        let input = order_for(&[(a.id, 2), (b.id, 1)]);
        let err = f.service.create(f.customer.id, input).await.unwrap_err();
        assert_eq!(err.to_string(), "Not enough stock for B");
        // Earlier lines are not rolled back.
        assert_eq!(f.repos.products.get_product(a.id).await.unwrap().unwrap().stock_qty, 3);
        assert_eq!(f.repos.products.get_product(b.id).await.unwrap().unwrap().stock_qty, 5);
        assert!(f.repos.orders.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_id_generation_gives_up() {
        let mut repos = Repositories::in_memory();
        let p = product(&repos, "Quince", 100, 5).await;
        repos.orders = Arc::new(ExhaustedOrderIds { inner: repos.orders.clone() });
        let f = fixture_on(repos, dispatcher(), quiet_email()).await;

        let err = f.service.create(f.customer.id, order_for(&[(p.id, 1)])).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate unique order id");
        assert_eq!(f.repos.products.get_product(p.id).await.unwrap().unwrap().stock_qty, 5);
        assert!(f.repos.orders.list_orders().await.unwrap().is_empty());
    }
}
