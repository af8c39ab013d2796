//! HTTP surface: shared state, the router and one handler module per resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::integrations::SignatureVerifier;
use crate::services::{uploads::MAX_IMAGE_BYTES, Services};

mod auth;
mod catalog;
mod commerce;
mod extract;
mod uploads;
mod webhooks;

pub use extract::{AdminCustomer, AuthCustomer, ValidatedJson};

pub const SERVICE_NAME: &str = "opensase-storefront";

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub verifier: SignatureVerifier,
}

impl AppState {
    pub fn new(services: Services, verifier: SignatureVerifier) -> Self { Self { services, verifier } }
}

/// Body returned by delete routes.
pub(crate) fn deleted() -> Json<Value> { Json(json!({ "success": true })) }

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": SERVICE_NAME}))
}

/// Builds the application router. CORS is left to the caller.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/send-verification", post(auth::send_verification))
        .route("/auth/verify-code", post(auth::verify_code))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/email-exists", get(auth::email_exists))
        .route("/auth/me", get(auth::me).patch(auth::update_me))
        .route("/auth/me/password", patch(auth::change_password))
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route("/categories/:id", get(catalog::get_category).patch(catalog::update_category).delete(catalog::delete_category))
        .route("/categories/:id/image", put(catalog::category_image))
        .route("/products", get(catalog::list_products).post(catalog::create_product))
        .route("/products/:id", get(catalog::get_product).patch(catalog::update_product).delete(catalog::delete_product))
        .route("/products/:id/image", put(catalog::product_image))
        .route("/customers", get(commerce::list_customers))
        .route("/customers/:id", get(commerce::get_customer).patch(commerce::update_customer))
        .route("/orders", get(commerce::list_orders).post(commerce::create_order))
        .route("/orders/my", get(commerce::my_orders))
        .route("/orders/my/:id", get(commerce::my_order))
        .route("/orders/my/:id/cancel", patch(commerce::cancel_my_order))
        .route("/orders/validate-referral/:code", get(commerce::validate_referral))
        .route("/orders/sales", get(commerce::sales_report))
        .route("/orders/dashboard", get(commerce::dashboard))
        .route("/orders/referral/:code", get(commerce::orders_by_referral))
        .route("/orders/:id/status", patch(commerce::update_order_status))
        .route("/orders/:id/shipment", patch(commerce::update_shipment))
        .route("/coupons", get(commerce::list_coupons).post(commerce::create_coupon))
        .route("/coupons/my", get(commerce::my_coupons))
        .route("/coupons/validate/:code", get(commerce::validate_coupon))
        .route("/coupons/:id", get(commerce::get_coupon).patch(commerce::update_coupon).delete(commerce::delete_coupon))
        .route("/referrals", get(commerce::list_referrals).post(commerce::create_referral))
        .route("/referrals/:id", get(commerce::get_referral).patch(commerce::update_referral))
        .route("/uploads/s3/presign", post(uploads::presign))
        .route("/uploads/s3/image", post(uploads::upload_image))
        .route(crate::services::reminders::WEBHOOK_PATH, post(webhooks::qstash_email))
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
