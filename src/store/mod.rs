//! Persistence ports and their adapters.
//!
//! Every collection is reached through an `async_trait` repository so services
//! can run against PostgreSQL in production and [`MemoryStore`] in tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::{Category, Coupon, Customer, EmailVerification, Order, OrderStatus, Product, ReferralProgram};
use crate::domain::value_objects::EmailAddress;
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Filter and page for the product listing.
#[derive(Clone, Debug, PartialEq)]
pub struct ProductQuery {
    pub text: Option<String>,
    pub category_id: Option<Uuid>,
    pub page: u32,
    pub limit: u32,
}

impl ProductQuery {
    pub fn offset(&self) -> u64 { u64::from(self.page.saturating_sub(1)) * u64::from(self.limit) }
}

#[async_trait]
pub trait CategoryStore: Send + Sync {
    async fn insert_category(&self, category: &Category) -> Result<()>;
    async fn update_category(&self, category: &Category) -> Result<()>;
    async fn get_category(&self, id: Uuid) -> Result<Option<Category>>;
    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>>;
    async fn list_categories(&self) -> Result<Vec<Category>>;
    async fn delete_category(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn update_product(&self, product: &Product) -> Result<()>;
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>>;
    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>>;
    /// Newest first, with the total number of matches.
    async fn search_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)>;
    async fn list_products(&self) -> Result<Vec<Product>>;
    async fn delete_product(&self, id: Uuid) -> Result<bool>;
    /// Decrements only while `stock_qty >= qty`; returns whether the row changed.
    async fn decrement_stock(&self, id: Uuid, qty: u32) -> Result<bool>;
    async fn restore_stock(&self, id: Uuid, qty: u32) -> Result<()>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn insert_customer(&self, customer: &Customer) -> Result<()>;
    async fn update_customer(&self, customer: &Customer) -> Result<()>;
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>>;
    async fn find_customer_by_email(&self, email: &EmailAddress) -> Result<Option<Customer>>;
    async fn find_customer_by_referral_code(&self, code: &str) -> Result<Option<Customer>>;
    async fn referral_code_taken(&self, code: &str) -> Result<bool>;
    async fn list_customers(&self) -> Result<Vec<Customer>>;
    async fn count_customers(&self) -> Result<u64>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()>;
    async fn update_coupon(&self, coupon: &Coupon) -> Result<()>;
    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>>;
    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;
    async fn coupon_code_taken(&self, code: &str) -> Result<bool>;
    async fn list_coupons(&self) -> Result<Vec<Coupon>>;
    /// Unused, active coupons owned by the customer, newest first.
    async fn list_available_coupons(&self, customer_id: Uuid) -> Result<Vec<Coupon>>;
    async fn delete_coupon(&self, id: Uuid) -> Result<bool>;
    /// Marks the coupon used only if it is still unused.
    async fn mark_coupon_used(&self, id: Uuid, order_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait ReferralStore: Send + Sync {
    async fn insert_program(&self, program: &ReferralProgram) -> Result<()>;
    async fn update_program(&self, program: &ReferralProgram) -> Result<()>;
    async fn get_program(&self, id: Uuid) -> Result<Option<ReferralProgram>>;
    async fn list_programs(&self) -> Result<Vec<ReferralProgram>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<()>;
    async fn order_id_taken(&self, order_id: &str) -> Result<bool>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn find_order_by_public_id(&self, order_id: &str) -> Result<Option<Order>>;
    async fn list_orders(&self) -> Result<Vec<Order>>;
    async fn list_orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>>;
    async fn list_orders_by_referral_code(&self, code: &str) -> Result<Vec<Order>>;
    async fn update_order(&self, order: &Order) -> Result<()>;
    /// Writes the order only while the stored status still equals `expected`.
    async fn update_order_if_status(&self, order: &Order, expected: OrderStatus) -> Result<bool>;
    async fn set_reminder_handles(&self, id: Uuid, handles: &[String]) -> Result<()>;
}

#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn insert_verification(&self, record: &EmailVerification) -> Result<()>;
    async fn count_verifications_since(&self, email: &EmailAddress, since: DateTime<Utc>) -> Result<usize>;
    async fn latest_pending_verification(&self, email: &EmailAddress, now: DateTime<Utc>) -> Result<Option<EmailVerification>>;
    async fn record_failed_attempt(&self, id: Uuid) -> Result<()>;
    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;
    async fn purge_expired_verifications(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// All repositories, shared by the services.
#[derive(Clone)]
pub struct Repositories {
    pub categories: Arc<dyn CategoryStore>,
    pub products: Arc<dyn ProductStore>,
    pub customers: Arc<dyn CustomerStore>,
    pub coupons: Arc<dyn CouponStore>,
    pub referrals: Arc<dyn ReferralStore>,
    pub orders: Arc<dyn OrderStore>,
    pub verifications: Arc<dyn VerificationStore>,
}

impl Repositories {
    pub fn in_memory() -> Self { Self::from_store(Arc::new(MemoryStore::default())) }

    pub fn postgres(pool: PgPool) -> Self { Self::from_store(Arc::new(PgStore::new(pool))) }

    fn from_store<S>(store: Arc<S>) -> Self
    where
        S: CategoryStore + ProductStore + CustomerStore + CouponStore + ReferralStore + OrderStore + VerificationStore + 'static,
    {
        Self {
            categories: store.clone(),
            products: store.clone(),
            customers: store.clone(),
            coupons: store.clone(),
            referrals: store.clone(),
            orders: store.clone(),
            verifications: store,
        }
    }
}
