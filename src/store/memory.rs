//! In-memory store for tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{CategoryStore, CouponStore, CustomerStore, OrderStore, ProductQuery, ProductStore, ReferralStore, VerificationStore};
use crate::domain::aggregates::{Category, Coupon, Customer, EmailVerification, Order, OrderStatus, Product, ReferralProgram};
use crate::domain::value_objects::EmailAddress;
use crate::error::{EcommerceError, Result};

/// Thread-safe in-memory implementation of every repository.
#[derive(Default)]
pub struct MemoryStore {
    categories: RwLock<HashMap<Uuid, Category>>,
    products: RwLock<HashMap<Uuid, Product>>,
    customers: RwLock<HashMap<Uuid, Customer>>,
    coupons: RwLock<HashMap<Uuid, Coupon>>,
    referrals: RwLock<HashMap<Uuid, ReferralProgram>>,
    orders: RwLock<HashMap<Uuid, Order>>,
    verifications: RwLock<HashMap<Uuid, EmailVerification>>,
}

fn newest_first<T>(mut rows: Vec<T>, key: impl Fn(&T) -> (DateTime<Utc>, Uuid)) -> Vec<T> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

fn replace<T>(map: &RwLock<HashMap<Uuid, T>>, id: Uuid, value: T, what: &'static str) -> Result<()> {
    let mut map = map.write();
    match map.get_mut(&id) {
        Some(slot) => { *slot = value; Ok(()) }
        None => Err(EcommerceError::NotFound(what)),
    }
}

#[async_trait]
impl CategoryStore for MemoryStore {
    async fn insert_category(&self, category: &Category) -> Result<()> {
        let mut categories = self.categories.write();
        if categories.values().any(|c| c.name == category.name) {
            return Err(EcommerceError::Conflict("Category name already exists".into()));
        }
        categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> Result<()> {
        if self.categories.read().values().any(|c| c.name == category.name && c.id != category.id) {
            return Err(EcommerceError::Conflict("Category name already exists".into()));
        }
        replace(&self.categories, category.id, category.clone(), "Category")
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>> { Ok(self.categories.read().get(&id).cloned()) }

    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        Ok(self.categories.read().values().find(|c| c.name == name).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut all: Vec<_> = self.categories.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool> { Ok(self.categories.write().remove(&id).is_some()) }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.products.write().insert(product.id, product.clone());
        Ok(())
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        replace(&self.products, product.id, product.clone(), "Product")
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> { Ok(self.products.read().get(&id).cloned()) }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let products = self.products.read();
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    async fn search_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        let needle = query.text.as_deref().map(str::to_lowercase);
        let matches: Vec<_> = self.products.read().values()
            .filter(|p| query.category_id.map_or(true, |c| p.in_category(c)))
            .filter(|p| needle.as_deref().map_or(true, |n| p.name.to_lowercase().contains(n)))
            .cloned()
            .collect();
        let total = matches.len() as u64;
        let page = newest_first(matches, |p| (p.created_at, p.id))
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(newest_first(self.products.read().values().cloned().collect(), |p| (p.created_at, p.id)))
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> { Ok(self.products.write().remove(&id).is_some()) }

    async fn decrement_stock(&self, id: Uuid, qty: u32) -> Result<bool> {
        let mut products = self.products.write();
        match products.get_mut(&id) {
            Some(p) if p.stock_qty >= qty => {
                p.stock_qty -= qty;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore_stock(&self, id: Uuid, qty: u32) -> Result<()> {
        if let Some(p) = self.products.write().get_mut(&id) {
            p.stock_qty = p.stock_qty.saturating_add(qty);
        }
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        let mut customers = self.customers.write();
        if customers.values().any(|c| c.email == customer.email) {
            return Err(EcommerceError::Conflict("Email already registered".into()));
        }
        customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn update_customer(&self, customer: &Customer) -> Result<()> {
        if self.customers.read().values().any(|c| c.email == customer.email && c.id != customer.id) {
            return Err(EcommerceError::Conflict("Email already registered".into()));
        }
        replace(&self.customers, customer.id, customer.clone(), "Customer")
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> { Ok(self.customers.read().get(&id).cloned()) }

    async fn find_customer_by_email(&self, email: &EmailAddress) -> Result<Option<Customer>> {
        Ok(self.customers.read().values().find(|c| &c.email == email).cloned())
    }

    async fn find_customer_by_referral_code(&self, code: &str) -> Result<Option<Customer>> {
        Ok(self.customers.read().values().find(|c| c.referral_code().is_some_and(|rc| rc.as_str() == code)).cloned())
    }

    async fn referral_code_taken(&self, code: &str) -> Result<bool> {
        Ok(self.find_customer_by_referral_code(code).await?.is_some())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        Ok(newest_first(self.customers.read().values().cloned().collect(), |c| (c.created_at, c.id)))
    }

    async fn count_customers(&self) -> Result<u64> { Ok(self.customers.read().len() as u64) }
}

#[async_trait]
impl CouponStore for MemoryStore {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut coupons = self.coupons.write();
        if coupons.values().any(|c| c.code == coupon.code) {
            return Err(EcommerceError::Conflict("Coupon code already exists".into()));
        }
        coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn update_coupon(&self, coupon: &Coupon) -> Result<()> {
        replace(&self.coupons, coupon.id, coupon.clone(), "Coupon")
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>> { Ok(self.coupons.read().get(&id).cloned()) }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        Ok(self.coupons.read().values().find(|c| c.code.as_str() == code).cloned())
    }

    async fn coupon_code_taken(&self, code: &str) -> Result<bool> { Ok(self.find_coupon_by_code(code).await?.is_some()) }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        Ok(newest_first(self.coupons.read().values().cloned().collect(), |c| (c.created_at, c.id)))
    }

    async fn list_available_coupons(&self, customer_id: Uuid) -> Result<Vec<Coupon>> {
        let mine = self.coupons.read().values()
            .filter(|c| c.customer_id == customer_id && !c.is_used && c.active)
            .cloned()
            .collect();
        Ok(newest_first(mine, |c| (c.created_at, c.id)))
    }

    async fn delete_coupon(&self, id: Uuid) -> Result<bool> { Ok(self.coupons.write().remove(&id).is_some()) }

    async fn mark_coupon_used(&self, id: Uuid, order_id: Uuid) -> Result<bool> {
        Ok(self.coupons.write().get_mut(&id).is_some_and(|c| c.mark_used(order_id).is_ok()))
    }
}

#[async_trait]
impl ReferralStore for MemoryStore {
    async fn insert_program(&self, program: &ReferralProgram) -> Result<()> {
        self.referrals.write().insert(program.id, program.clone());
        Ok(())
    }

    async fn update_program(&self, program: &ReferralProgram) -> Result<()> {
        replace(&self.referrals, program.id, program.clone(), "Referral")
    }

    async fn get_program(&self, id: Uuid) -> Result<Option<ReferralProgram>> { Ok(self.referrals.read().get(&id).cloned()) }

    async fn list_programs(&self) -> Result<Vec<ReferralProgram>> {
        Ok(newest_first(self.referrals.read().values().cloned().collect(), |p| (p.created_at, p.id)))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write();
        if orders.values().any(|o| o.order_id == order.order_id) {
            return Err(EcommerceError::Conflict("Duplicate order id".into()));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order_id_taken(&self, order_id: &str) -> Result<bool> {
        Ok(self.orders.read().values().any(|o| o.order_id.as_str() == order_id))
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> { Ok(self.orders.read().get(&id).cloned()) }

    async fn find_order_by_public_id(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().values().find(|o| o.order_id.as_str() == order_id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        Ok(newest_first(self.orders.read().values().cloned().collect(), |o| (o.created_at, o.id)))
    }

    async fn list_orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>> {
        let mine = self.orders.read().values().filter(|o| o.customer_id == customer_id).cloned().collect();
        Ok(newest_first(mine, |o| (o.created_at, o.id)))
    }

    async fn list_orders_by_referral_code(&self, code: &str) -> Result<Vec<Order>> {
        let used = self.orders.read().values()
            .filter(|o| o.referral.as_ref().is_some_and(|r| r.referral_code_used == code))
            .cloned()
            .collect();
        Ok(newest_first(used, |o| (o.created_at, o.id)))
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        replace(&self.orders, order.id, order.clone(), "Order")
    }

    async fn update_order_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool> {
        let mut orders = self.orders.write();
        match orders.get_mut(&order.id) {
            Some(stored) if stored.status == expected => {
                *stored = order.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_reminder_handles(&self, id: Uuid, handles: &[String]) -> Result<()> {
        match self.orders.write().get_mut(&id) {
            Some(o) => { o.reminder_message_ids = handles.to_vec(); Ok(()) }
            None => Err(EcommerceError::NotFound("Order")),
        }
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn insert_verification(&self, record: &EmailVerification) -> Result<()> {
        self.verifications.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn count_verifications_since(&self, email: &EmailAddress, since: DateTime<Utc>) -> Result<usize> {
        Ok(self.verifications.read().values().filter(|v| &v.email == email && v.created_at >= since).count())
    }

    async fn latest_pending_verification(&self, email: &EmailAddress, now: DateTime<Utc>) -> Result<Option<EmailVerification>> {
        let pending = self.verifications.read().values()
            .filter(|v| &v.email == email && v.is_pending(now))
            .cloned()
            .collect();
        Ok(newest_first(pending, |v| (v.created_at, v.id)).into_iter().next())
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<()> {
        if let Some(v) = self.verifications.write().get_mut(&id) { v.attempts += 1; }
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(v) = self.verifications.write().get_mut(&id) {
            v.verified = true;
            v.verified_at = Some(at);
        }
        Ok(())
    }

    async fn purge_expired_verifications(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut all = self.verifications.write();
        let before = all.len();
        all.retain(|_, v| v.expires_at > now);
        Ok((before - all.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;

    #[tokio::test]
    async fn test_conditional_decrement() {
        let store = MemoryStore::default();
        let p = Product::create("Mango", Money::from_cents(300), 5);
        store.insert_product(&p).await.unwrap();
        assert!(store.decrement_stock(p.id, 3).await.unwrap());
        assert!(!store.decrement_stock(p.id, 3).await.unwrap());
        store.restore_stock(p.id, 3).await.unwrap();
        assert_eq!(store.get_product(p.id).await.unwrap().unwrap().stock_qty, 5);
    }

    #[tokio::test]
    async fn test_search_filters_and_pages() {
        let store = MemoryStore::default();
        let cat = Uuid::now_v7();
        for i in 0..5 {
            let mut p = Product::create(format!("Berry {i}"), Money::from_cents(100), 1);
            if i % 2 == 0 { p.assign_categories(vec![cat]); }
            store.insert_product(&p).await.unwrap();
        }
        let query = ProductQuery { text: Some("berry".into()), category_id: Some(cat), page: 1, limit: 2 };
        let (page, total) = store.search_products(&query).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
    }
}
