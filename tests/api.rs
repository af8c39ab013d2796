//! End-to-end requests through the router over in-memory repositories.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use opensase_storefront::domain::aggregates::{Coupon, Customer, Product};
use opensase_storefront::domain::value_objects::{EmailAddress, Money, PublicCode};
use opensase_storefront::integrations::{EmailJsClient, EventBus, NoopDispatcher, SignatureVerifier, UnconfiguredStorage};
use opensase_storefront::services::{Collaborators, ReminderSettings, Services, TokenService};
use opensase_storefront::store::Repositories;
use opensase_storefront::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

struct TestApp {
    app: Router,
    repos: Repositories,
    tokens: TokenService,
}

fn test_app_with(verifier: SignatureVerifier) -> TestApp {
    let repos = Repositories::in_memory();
    let tokens = TokenService::new("test-secret", 3600);
    let collaborators = Collaborators {
        dispatcher: Arc::new(NoopDispatcher),
        email: Arc::new(EmailJsClient::disabled()),
        storage: Arc::new(UnconfiguredStorage),
        events: EventBus::disabled(),
    };
    let mut services = Services::new(repos.clone(), collaborators, tokens.clone(), ReminderSettings::default());
    services.customers = services.customers.clone().with_password_cost(4);
    TestApp { app: router(AppState::new(services, verifier)), repos, tokens }
}

fn test_app() -> TestApp { test_app_with(SignatureVerifier::default()) }

impl TestApp {
    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(body.to_string())).unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn customer(&self, email: &str, is_admin: bool) -> (Customer, String) {
        let mut customer = Customer::register(EmailAddress::parse(email).unwrap(), "unused".into(), PublicCode::random_upper());
        customer.is_admin = is_admin;
        self.repos.customers.insert_customer(&customer).await.unwrap();
        let token = self.tokens.issue_access(customer.id, &customer.email).unwrap();
        (customer, token)
    }

    async fn product(&self, name: &str, cents: i64, stock: u32) -> Product {
        let product = Product::create(name, Money::from_cents(cents), stock);
        self.repos.products.insert_product(&product).await.unwrap();
        product
    }

    async fn stock(&self, product: &Product) -> u32 {
        self.repos.products.get_product(product.id).await.unwrap().unwrap().stock_qty
    }
}

fn amount(value: &Value) -> f64 { value.as_f64().unwrap() }

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "service": "opensase-storefront"}));
}

#[tokio::test]
async fn test_order_stock_is_checked_and_decremented() {
    let app = test_app();
    let (_, token) = app.customer("buyer@shop.io", false).await;
    let mints = app.product("Mints", 250, 5).await;
    let order = json!({"items": [{"productId": mints.id, "qty": 3}]});

    let (status, body) = app.call(Method::POST, "/orders", Some(&token), Some(order.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(amount(&body["total"]), 7.5);
    assert_eq!(app.stock(&mints).await, 2);

    let (status, body) = app.call(Method::POST, "/orders", Some(&token), Some(order)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Not enough stock for Mints");
    assert_eq!(app.stock(&mints).await, 2);
}

#[tokio::test]
async fn test_referral_discount_applies_to_order() {
    let app = test_app();
    let (_, admin) = app.customer("admin@shop.io", true).await;
    let (referrer, _) = app.customer("friend@shop.io", false).await;
    let (_, buyer) = app.customer("buyer@shop.io", false).await;
    let book = app.product("Book", 5_000, 10).await;

    let (status, program) = app.call(
        Method::POST, "/referrals", Some(&admin),
        Some(json!({"name": "Friends", "discountType": "percent", "discountValue": 10})),
    ).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app.call(
        Method::PATCH, &format!("/customers/{}", referrer.id), Some(&admin),
        Some(json!({"referralProgramId": program["id"]})),
    ).await;
    assert_eq!(status, StatusCode::OK);

    let code = referrer.referral_code().unwrap().as_str().to_lowercase();
    let (status, info) = app.call(Method::GET, &format!("/orders/validate-referral/{code}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["discountType"], "percent");

    let (status, order) = app.call(
        Method::POST, "/orders", Some(&buyer),
        Some(json!({"items": [{"productId": book.id, "qty": 1}], "referralCode": code})),
    ).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(amount(&order["discountAmount"]), 5.0);
    assert_eq!(amount(&order["total"]), 45.0);

    let (status, _) = app.call(
        Method::POST, "/orders", Some(&buyer),
        Some(json!({"items": [{"productId": book.id, "qty": 1}], "referralCode": "NOPE0000"})),
    ).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_coupons_stack_and_cannot_be_reused() {
    let app = test_app();
    let (buyer, token) = app.customer("buyer@shop.io", false).await;
    let book = app.product("Book", 5_000, 10).await;
    let small = Coupon::issue(PublicCode::random_upper(), buyer.id, Money::from_cents(2000), None, None);
    let large = Coupon::issue(PublicCode::random_upper(), buyer.id, Money::from_cents(4000), None, None);
    app.repos.coupons.insert_coupon(&small).await.unwrap();
    app.repos.coupons.insert_coupon(&large).await.unwrap();

    let (status, check) = app.call(Method::GET, &format!("/coupons/validate/{}", small.code.as_str()), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&check["value"]), 20.0);

    let order = json!({"items": [{"productId": book.id, "qty": 1}], "couponCodes": [small.code.as_str(), large.code.as_str()]});
    let (status, body) = app.call(Method::POST, "/orders", Some(&token), Some(order.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(amount(&body["couponDiscount"]), 50.0);
    assert_eq!(amount(&body["total"]), 0.0);

    let (status, body) = app.call(Method::POST, "/orders", Some(&token), Some(order)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "This coupon has already been used");

    let (_, mine) = app.call(Method::GET, "/coupons/my", Some(&token), None).await;
    assert_eq!(mine, json!([]));
}

#[tokio::test]
async fn test_cancel_restores_stock_once() {
    let app = test_app();
    let (_, token) = app.customer("buyer@shop.io", false).await;
    let (_, other) = app.customer("other@shop.io", false).await;
    let mints = app.product("Mints", 250, 5).await;

    let (_, order) = app.call(
        Method::POST, "/orders", Some(&token),
        Some(json!({"items": [{"productId": mints.id, "qty": 4}]})),
    ).await;
    let uri = format!("/orders/my/{}/cancel", order["id"].as_str().unwrap());

    let (status, _) = app.call(Method::PATCH, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, canceled) = app.call(Method::PATCH, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["status"], "canceled");
    assert_eq!(app.stock(&mints).await, 5);

    let (status, _) = app.call(Method::PATCH, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.stock(&mints).await, 5);
}

#[tokio::test]
async fn test_admin_routes_are_guarded() {
    let app = test_app();
    let (_, customer) = app.customer("buyer@shop.io", false).await;
    let (_, admin) = app.customer("admin@shop.io", true).await;

    let (status, body) = app.call(Method::GET, "/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["statusCode"], 401);

    let (status, _) = app.call(Method::GET, "/orders", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.call(Method::GET, "/orders/dashboard", Some(&customer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, dashboard) = app.call(Method::GET, "/orders/dashboard", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["totalCustomers"], 2);
}

#[tokio::test]
async fn test_catalog_admin_crud() {
    let app = test_app();
    let (_, admin) = app.customer("admin@shop.io", true).await;

    let (status, category) = app.call(Method::POST, "/categories", Some(&admin), Some(json!({"name": "Snacks"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, product) = app.call(
        Method::POST, "/products", Some(&admin),
        Some(json!({"name": "Chips", "price": 3.5, "stockQty": 7, "categoryId": category["id"]})),
    ).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(product["categoryIds"], json!([category["id"]]));

    let (status, page) = app.call(Method::GET, "/products?q=chip", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let uri = format!("/products/{}", product["id"].as_str().unwrap());
    let (status, body) = app.call(Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    let (status, _) = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_grants_welcome_and_referral_coupons() {
    let app = test_app();
    let verification = |email: &str| app.tokens.issue_verification(&EmailAddress::parse(email).unwrap()).unwrap();

    let (status, first) = app.call(Method::POST, "/auth/register", None, Some(json!({
        "email": "first@shop.io", "verificationToken": verification("first@shop.io"), "password": "correct horse",
    }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let first_token = first["accessToken"].as_str().unwrap().to_string();
    let code = first["customer"]["referralCode"].as_str().unwrap().to_string();

    let (status, second) = app.call(Method::POST, "/auth/register", None, Some(json!({
        "email": "second@shop.io", "verificationToken": verification("second@shop.io"), "password": "battery staple",
        "referralCode": code,
    }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, coupons) = app.call(Method::GET, "/coupons/my", Some(&first_token), None).await;
    assert_eq!(coupons.as_array().unwrap().len(), 2);
    let second_token = second["accessToken"].as_str().unwrap();
    let (_, coupons) = app.call(Method::GET, "/coupons/my", Some(second_token), None).await;
    assert_eq!(coupons.as_array().unwrap().len(), 2);

    let (status, session) = app.call(Method::POST, "/auth/login", None, Some(json!({
        "email": "FIRST@shop.io", "password": "correct horse",
    }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(session["accessToken"].is_string());

    let (status, _) = app.call(Method::POST, "/auth/login", None, Some(json!({
        "email": "first@shop.io", "password": "wrong password",
    }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, exists) = app.call(Method::GET, "/auth/email-exists?email=second@shop.io", None, None).await;
    assert_eq!(exists, json!({"exists": true}));
}

#[tokio::test]
async fn test_webhook_skips_unknown_order() {
    let app = test_app();
    let payload = json!({
        "type": "payment_reminder",
        "email": "buyer@shop.io",
        "orderDetails": {
            "id": "deadbeef", "total": 10.0, "subtotal": 10.0, "couponDiscount": 0.0,
            "customerName": "Buyer", "items": [], "reminderNumber": 2,
        },
    });
    let (status, body) = app.call(Method::POST, "/webhooks/qstash/email", None, Some(payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "skipped": true, "reason": "order_not_found"}));
}

#[tokio::test]
async fn test_webhook_requires_signature_when_keys_configured() {
    let app = test_app_with(SignatureVerifier::new(Some("current".into()), None));
    let (status, body) = app.call(Method::POST, "/webhooks/qstash/email", None, Some(json!({"type": "payment_reminder"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid signature");
}
