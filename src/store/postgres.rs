//! PostgreSQL adapter.
//!
//! Snapshots that the order keeps verbatim (items, shipping, referral, coupons)
//! are stored as JSONB; everything else maps onto plain columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{CategoryStore, CouponStore, CustomerStore, OrderStore, ProductQuery, ProductStore, ReferralStore, VerificationStore};
use crate::domain::aggregates::{
    Category, Coupon, CouponUsage, Customer, DiscountType, EmailVerification, Order, OrderItem, OrderStatus, Product,
    ReferralProgram, ReferralUsage, ShippingAddress, ShippingSnapshot,
};
use crate::domain::value_objects::{EmailAddress, Money, PublicCode};
use crate::error::{EcommerceError, Result};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

fn corrupt(what: &str) -> EcommerceError { EcommerceError::Storage(format!("corrupt {what} row")) }

fn to_i32(value: u32) -> Result<i32> { i32::try_from(value).map_err(|_| EcommerceError::validation("Quantity too large")) }

/// Escapes LIKE wildcards in user input.
fn like_pattern(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

#[derive(FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(r: CategoryRow) -> Self {
        Category { id: r.id, name: r.name, description: r.description, image_url: r.image_url, created_at: r.created_at, updated_at: r.updated_at }
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    disclaimer: Option<String>,
    price: Decimal,
    stock_qty: i32,
    category_id: Option<Uuid>,
    category_ids: Vec<Uuid>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = EcommerceError;
    fn try_from(r: ProductRow) -> Result<Self> {
        Ok(Product {
            id: r.id, name: r.name, description: r.description, disclaimer: r.disclaimer, price: Money::new(r.price),
            stock_qty: u32::try_from(r.stock_qty).map_err(|_| corrupt("product"))?,
            category_id: r.category_id, category_ids: r.category_ids, image_url: r.image_url,
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CustomerRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: Option<String>,
    last_name: Option<String>,
    phone: Option<String>,
    is_admin: bool,
    shipping_address: Option<Json<ShippingAddress>>,
    referral_program_id: Option<Uuid>,
    referral_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = EcommerceError;
    fn try_from(r: CustomerRow) -> Result<Self> {
        Ok(Customer {
            id: r.id,
            email: EmailAddress::parse(&r.email).map_err(|_| corrupt("customer"))?,
            password_hash: r.password_hash, first_name: r.first_name, last_name: r.last_name, phone: r.phone,
            is_admin: r.is_admin, shipping_address: r.shipping_address.map(|j| j.0),
            referral_program_id: r.referral_program_id,
            referral_code: r.referral_code.map(PublicCode::from_stored),
            created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    customer_id: Uuid,
    value: Decimal,
    is_used: bool,
    used_in_order_id: Option<Uuid>,
    expiry_date: Option<DateTime<Utc>>,
    active: bool,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = EcommerceError;
    fn try_from(r: CouponRow) -> Result<Self> {
        Ok(Coupon {
            id: r.id, code: PublicCode::from_stored(r.code), customer_id: r.customer_id, value: Money::new(r.value),
            is_used: r.is_used, used_in_order_id: r.used_in_order_id, expiry_date: r.expiry_date, active: r.active,
            description: r.description, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ReferralRow {
    id: Uuid,
    name: String,
    discount_type: String,
    discount_value: Decimal,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReferralRow> for ReferralProgram {
    type Error = EcommerceError;
    fn try_from(r: ReferralRow) -> Result<Self> {
        Ok(ReferralProgram {
            id: r.id, name: r.name,
            discount_type: DiscountType::parse(&r.discount_type).ok_or_else(|| corrupt("referral"))?,
            discount_value: r.discount_value, active: r.active, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    order_id: String,
    customer_id: Uuid,
    items: Json<Vec<OrderItem>>,
    subtotal: Decimal,
    discount_amount: Decimal,
    coupon_discount: Decimal,
    total: Decimal,
    status: String,
    shipping: Json<ShippingSnapshot>,
    referral: Option<Json<ReferralUsage>>,
    coupons_used: Json<Vec<CouponUsage>>,
    reminder_message_ids: Vec<String>,
    shipping_carrier: Option<String>,
    tracking_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = EcommerceError;
    fn try_from(r: OrderRow) -> Result<Self> {
        Ok(Order {
            id: r.id,
            order_id: PublicCode::from_stored(r.order_id),
            customer_id: r.customer_id, items: r.items.0,
            subtotal: Money::new(r.subtotal), discount_amount: Money::new(r.discount_amount),
            coupon_discount: Money::new(r.coupon_discount), total: Money::new(r.total),
            status: OrderStatus::parse(&r.status).ok_or_else(|| corrupt("order"))?,
            shipping: r.shipping.0, referral: r.referral.map(|j| j.0), coupons_used: r.coupons_used.0,
            reminder_message_ids: r.reminder_message_ids, shipping_carrier: r.shipping_carrier,
            tracking_number: r.tracking_number, created_at: r.created_at, updated_at: r.updated_at, events: vec![],
        })
    }
}

#[derive(FromRow)]
struct VerificationRow {
    id: Uuid,
    email: String,
    code_hash: String,
    expires_at: DateTime<Utc>,
    attempts: i32,
    verified: bool,
    verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for EmailVerification {
    type Error = EcommerceError;
    fn try_from(r: VerificationRow) -> Result<Self> {
        Ok(EmailVerification {
            id: r.id, email: EmailAddress::parse(&r.email).map_err(|_| corrupt("verification"))?,
            code_hash: r.code_hash, expires_at: r.expires_at,
            attempts: u32::try_from(r.attempts).unwrap_or(0), verified: r.verified,
            verified_at: r.verified_at, created_at: r.created_at,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = EcommerceError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const CATEGORY_COLUMNS: &str = "id, name, description, image_url, created_at, updated_at";
const PRODUCT_COLUMNS: &str =
    "id, name, description, disclaimer, price, stock_qty, category_id, category_ids, image_url, created_at, updated_at";
const CUSTOMER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, phone, is_admin, shipping_address, \
     referral_program_id, referral_code, created_at, updated_at";
const COUPON_COLUMNS: &str =
    "id, code, customer_id, value, is_used, used_in_order_id, expiry_date, active, description, created_at, updated_at";
const REFERRAL_COLUMNS: &str = "id, name, discount_type, discount_value, active, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, order_id, customer_id, items, subtotal, discount_amount, coupon_discount, total, status, \
     shipping, referral, coupons_used, reminder_message_ids, shipping_carrier, tracking_number, created_at, updated_at";
const VERIFICATION_COLUMNS: &str = "id, email, code_hash, expires_at, attempts, verified, verified_at, created_at";

#[async_trait]
impl CategoryStore for PgStore {
    async fn insert_category(&self, c: &Category) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, description, image_url, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(c.id).bind(&c.name).bind(&c.description).bind(&c.image_url).bind(c.created_at).bind(c.updated_at)
            .execute(&self.pool).await
            .map_err(|e| match EcommerceError::from(e) {
                EcommerceError::Conflict(_) => EcommerceError::Conflict("Category name already exists".into()),
                other => other,
            })?;
        Ok(())
    }

    async fn update_category(&self, c: &Category) -> Result<()> {
        let result = sqlx::query("UPDATE categories SET name = $2, description = $3, image_url = $4, updated_at = $5 WHERE id = $1")
            .bind(c.id).bind(&c.name).bind(&c.description).bind(&c.image_url).bind(c.updated_at)
            .execute(&self.pool).await
            .map_err(|e| match EcommerceError::from(e) {
                EcommerceError::Conflict(_) => EcommerceError::Conflict("Category name already exists".into()),
                other => other,
            })?;
        if result.rows_affected() == 0 { return Err(EcommerceError::NotFound("Category")); }
        Ok(())
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(Category::from))
    }

    async fn find_category_by_name(&self, name: &str) -> Result<Option<Category>> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE name = $1"))
            .bind(name).fetch_optional(&self.pool).await?;
        Ok(row.map(Category::from))
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query_as::<_, CategoryRow>(&format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY name"))
            .fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert_product(&self, p: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, name, description, disclaimer, price, stock_qty, category_id, category_ids, image_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(p.id).bind(&p.name).bind(&p.description).bind(&p.disclaimer).bind(p.price.amount())
        .bind(to_i32(p.stock_qty)?).bind(p.category_id).bind(&p.category_ids).bind(&p.image_url)
        .bind(p.created_at).bind(p.updated_at)
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_product(&self, p: &Product) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET name = $2, description = $3, disclaimer = $4, price = $5, stock_qty = $6, \
             category_id = $7, category_ids = $8, image_url = $9, updated_at = $10 WHERE id = $1",
        )
        .bind(p.id).bind(&p.name).bind(&p.description).bind(&p.disclaimer).bind(p.price.amount())
        .bind(to_i32(p.stock_qty)?).bind(p.category_id).bind(&p.category_ids).bind(&p.image_url).bind(p.updated_at)
        .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(EcommerceError::NotFound("Product")); }
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        row.map(Product::try_from).transpose()
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"))
            .bind(ids).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn search_products(&self, q: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        const FILTER: &str = "($1::text IS NULL OR name ILIKE $1) AND ($2::uuid IS NULL OR category_id = $2 OR $2 = ANY(category_ids))";
        let pattern = q.text.as_deref().map(like_pattern);
        let offset = i64::try_from(q.offset()).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE {FILTER} ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(&pattern).bind(q.category_id).bind(i64::from(q.limit)).bind(offset)
        .fetch_all(&self.pool).await?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products WHERE {FILTER}"))
            .bind(&pattern).bind(q.category_id)
            .fetch_one(&self.pool).await?;
        Ok((collect(rows)?, u64::try_from(total).unwrap_or(0)))
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn decrement_stock(&self, id: Uuid, qty: u32) -> Result<bool> {
        let result = sqlx::query("UPDATE products SET stock_qty = stock_qty - $2, updated_at = NOW() WHERE id = $1 AND stock_qty >= $2")
            .bind(id).bind(to_i32(qty)?)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn restore_stock(&self, id: Uuid, qty: u32) -> Result<()> {
        sqlx::query("UPDATE products SET stock_qty = stock_qty + $2, updated_at = NOW() WHERE id = $1")
            .bind(id).bind(to_i32(qty)?)
            .execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl CustomerStore for PgStore {
    async fn insert_customer(&self, c: &Customer) -> Result<()> {
        sqlx::query(
            "INSERT INTO customers (id, email, password_hash, first_name, last_name, phone, is_admin, shipping_address, \
             referral_program_id, referral_code, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(c.id).bind(c.email.as_str()).bind(&c.password_hash).bind(&c.first_name).bind(&c.last_name).bind(&c.phone)
        .bind(c.is_admin).bind(c.shipping_address.clone().map(Json)).bind(c.referral_program_id)
        .bind(c.referral_code().map(PublicCode::as_str)).bind(c.created_at).bind(c.updated_at)
        .execute(&self.pool).await
        .map_err(|e| match EcommerceError::from(e) {
            EcommerceError::Conflict(_) => EcommerceError::Conflict("Email already registered".into()),
            other => other,
        })?;
        Ok(())
    }

    async fn update_customer(&self, c: &Customer) -> Result<()> {
        let result = sqlx::query(
            "UPDATE customers SET email = $2, password_hash = $3, first_name = $4, last_name = $5, phone = $6, is_admin = $7, \
             shipping_address = $8, referral_program_id = $9, referral_code = COALESCE(referral_code, $10), updated_at = $11 WHERE id = $1",
        )
        .bind(c.id).bind(c.email.as_str()).bind(&c.password_hash).bind(&c.first_name).bind(&c.last_name).bind(&c.phone)
        .bind(c.is_admin).bind(c.shipping_address.clone().map(Json)).bind(c.referral_program_id)
        .bind(c.referral_code().map(PublicCode::as_str)).bind(c.updated_at)
        .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(EcommerceError::NotFound("Customer")); }
        Ok(())
    }

    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        row.map(Customer::try_from).transpose()
    }

    async fn find_customer_by_email(&self, email: &EmailAddress) -> Result<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE email = $1"))
            .bind(email.as_str()).fetch_optional(&self.pool).await?;
        row.map(Customer::try_from).transpose()
    }

    async fn find_customer_by_referral_code(&self, code: &str) -> Result<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE referral_code = $1"))
            .bind(code).fetch_optional(&self.pool).await?;
        row.map(Customer::try_from).transpose()
    }

    async fn referral_code_taken(&self, code: &str) -> Result<bool> {
        Ok(sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE referral_code = $1)")
            .bind(code).fetch_one(&self.pool).await?)
    }

    async fn list_customers(&self) -> Result<Vec<Customer>> {
        let rows = sqlx::query_as::<_, CustomerRow>(&format!("SELECT {CUSTOMER_COLUMNS} FROM customers ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn count_customers(&self) -> Result<u64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers").fetch_one(&self.pool).await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

#[async_trait]
impl CouponStore for PgStore {
    async fn insert_coupon(&self, c: &Coupon) -> Result<()> {
        sqlx::query(
            "INSERT INTO coupons (id, code, customer_id, value, is_used, used_in_order_id, expiry_date, active, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(c.id).bind(c.code.as_str()).bind(c.customer_id).bind(c.value.amount()).bind(c.is_used).bind(c.used_in_order_id)
        .bind(c.expiry_date).bind(c.active).bind(&c.description).bind(c.created_at).bind(c.updated_at)
        .execute(&self.pool).await
        .map_err(|e| match EcommerceError::from(e) {
            EcommerceError::Conflict(_) => EcommerceError::Conflict("Coupon code already exists".into()),
            other => other,
        })?;
        Ok(())
    }

    async fn update_coupon(&self, c: &Coupon) -> Result<()> {
        let result = sqlx::query(
            "UPDATE coupons SET value = $2, is_used = $3, used_in_order_id = $4, expiry_date = $5, active = $6, \
             description = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(c.id).bind(c.value.amount()).bind(c.is_used).bind(c.used_in_order_id).bind(c.expiry_date).bind(c.active)
        .bind(&c.description).bind(c.updated_at)
        .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(EcommerceError::NotFound("Coupon")); }
        Ok(())
    }

    async fn get_coupon(&self, id: Uuid) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"))
            .bind(code).fetch_optional(&self.pool).await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn coupon_code_taken(&self, code: &str) -> Result<bool> {
        Ok(sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM coupons WHERE code = $1)")
            .bind(code).fetch_one(&self.pool).await?)
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!("SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn list_available_coupons(&self, customer_id: Uuid) -> Result<Vec<Coupon>> {
        let rows = sqlx::query_as::<_, CouponRow>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE customer_id = $1 AND NOT is_used AND active ORDER BY created_at DESC, id DESC"
        ))
        .bind(customer_id).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn delete_coupon(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_coupon_used(&self, id: Uuid, order_id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE coupons SET is_used = TRUE, used_in_order_id = $2, updated_at = NOW() WHERE id = $1 AND NOT is_used")
            .bind(id).bind(order_id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ReferralStore for PgStore {
    async fn insert_program(&self, p: &ReferralProgram) -> Result<()> {
        sqlx::query(
            "INSERT INTO referral_programs (id, name, discount_type, discount_value, active, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(p.id).bind(&p.name).bind(p.discount_type.as_str()).bind(p.discount_value).bind(p.active)
        .bind(p.created_at).bind(p.updated_at)
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn update_program(&self, p: &ReferralProgram) -> Result<()> {
        let result = sqlx::query(
            "UPDATE referral_programs SET name = $2, discount_type = $3, discount_value = $4, active = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(p.id).bind(&p.name).bind(p.discount_type.as_str()).bind(p.discount_value).bind(p.active).bind(p.updated_at)
        .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(EcommerceError::NotFound("Referral")); }
        Ok(())
    }

    async fn get_program(&self, id: Uuid) -> Result<Option<ReferralProgram>> {
        let row = sqlx::query_as::<_, ReferralRow>(&format!("SELECT {REFERRAL_COLUMNS} FROM referral_programs WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        row.map(ReferralProgram::try_from).transpose()
    }

    async fn list_programs(&self) -> Result<Vec<ReferralProgram>> {
        let rows = sqlx::query_as::<_, ReferralRow>(&format!(
            "SELECT {REFERRAL_COLUMNS} FROM referral_programs ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool).await?;
        collect(rows)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, o: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, order_id, customer_id, items, subtotal, discount_amount, coupon_discount, total, status, \
             shipping, referral, referral_code_used, coupons_used, reminder_message_ids, shipping_carrier, tracking_number, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(o.id).bind(o.order_id.as_str()).bind(o.customer_id).bind(Json(&o.items))
        .bind(o.subtotal.amount()).bind(o.discount_amount.amount()).bind(o.coupon_discount.amount()).bind(o.total.amount())
        .bind(o.status.as_str()).bind(Json(&o.shipping)).bind(o.referral.as_ref().map(Json))
        .bind(o.referral.as_ref().map(|r| r.referral_code_used.as_str()))
        .bind(Json(&o.coupons_used)).bind(&o.reminder_message_ids).bind(&o.shipping_carrier).bind(&o.tracking_number)
        .bind(o.created_at).bind(o.updated_at)
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn order_id_taken(&self, order_id: &str) -> Result<bool> {
        Ok(sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE order_id = $1)")
            .bind(order_id).fetch_one(&self.pool).await?)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id).fetch_optional(&self.pool).await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_order_by_public_id(&self, order_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1"))
            .bind(order_id).fetch_optional(&self.pool).await?;
        row.map(Order::try_from).transpose()
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"))
            .fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn list_orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(customer_id).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn list_orders_by_referral_code(&self, code: &str) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE referral_code_used = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(code).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn update_order(&self, o: &Order) -> Result<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, reminder_message_ids = $3, shipping_carrier = $4, tracking_number = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(o.id).bind(o.status.as_str()).bind(&o.reminder_message_ids).bind(&o.shipping_carrier)
        .bind(&o.tracking_number).bind(o.updated_at)
        .execute(&self.pool).await?;
        if result.rows_affected() == 0 { return Err(EcommerceError::NotFound("Order")); }
        Ok(())
    }

    async fn update_order_if_status(&self, o: &Order, expected: OrderStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, reminder_message_ids = $3, shipping_carrier = $4, tracking_number = $5, updated_at = $6 \
             WHERE id = $1 AND status = $7",
        )
        .bind(o.id).bind(o.status.as_str()).bind(&o.reminder_message_ids).bind(&o.shipping_carrier)
        .bind(&o.tracking_number).bind(o.updated_at).bind(expected.as_str())
        .execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_reminder_handles(&self, id: Uuid, handles: &[String]) -> Result<()> {
        sqlx::query("UPDATE orders SET reminder_message_ids = $2 WHERE id = $1")
            .bind(id).bind(handles)
            .execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for PgStore {
    async fn insert_verification(&self, v: &EmailVerification) -> Result<()> {
        sqlx::query(
            "INSERT INTO email_verifications (id, email, code_hash, expires_at, attempts, verified, verified_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(v.id).bind(v.email.as_str()).bind(&v.code_hash).bind(v.expires_at).bind(i32::try_from(v.attempts).unwrap_or(i32::MAX))
        .bind(v.verified).bind(v.verified_at).bind(v.created_at)
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn count_verifications_since(&self, email: &EmailAddress, since: DateTime<Utc>) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_verifications WHERE email = $1 AND created_at >= $2")
            .bind(email.as_str()).bind(since).fetch_one(&self.pool).await?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    async fn latest_pending_verification(&self, email: &EmailAddress, now: DateTime<Utc>) -> Result<Option<EmailVerification>> {
        let row = sqlx::query_as::<_, VerificationRow>(&format!(
            "SELECT {VERIFICATION_COLUMNS} FROM email_verifications WHERE email = $1 AND NOT verified AND expires_at > $2 \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(email.as_str()).bind(now).fetch_optional(&self.pool).await?;
        row.map(EmailVerification::try_from).transpose()
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE email_verifications SET attempts = attempts + 1 WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE email_verifications SET verified = TRUE, verified_at = $2 WHERE id = $1")
            .bind(id).bind(at).execute(&self.pool).await?;
        Ok(())
    }

    async fn purge_expired_verifications(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM email_verifications WHERE expires_at <= $1").bind(now).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
