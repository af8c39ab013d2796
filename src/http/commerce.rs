//! Customers, orders, coupons and referral programs.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use super::{deleted, AdminCustomer, AppState, AuthCustomer, ValidatedJson};
use crate::domain::aggregates::{Coupon, CustomerProfile, Order, ReferralProgram};
use crate::error::Result;
use crate::services::analytics::{Dashboard, SalesReport};
use crate::services::coupons::{CouponCheck, CouponUpdate, CouponWithOwner, NewCoupon};
use crate::services::customers::CustomerUpdate;
use crate::services::orders::{NewOrder, OrderWithCustomer, ShipmentUpdate, StatusUpdate};
use crate::services::referrals::{NewReferralProgram, ReferralCodeInfo, ReferralProgramUpdate};

// Customers

pub async fn list_customers(State(s): State<AppState>, _admin: AdminCustomer) -> Result<Json<Vec<CustomerProfile>>> {
    Ok(Json(s.services.customers.list().await?))
}

pub async fn get_customer(State(s): State<AppState>, _admin: AdminCustomer, Path(id): Path<Uuid>) -> Result<Json<CustomerProfile>> {
    Ok(Json(s.services.customers.profile(id).await?))
}

pub async fn update_customer(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<CustomerUpdate>,
) -> Result<Json<CustomerProfile>> {
    Ok(Json(s.services.customers.admin_update(id, body).await?))
}

// Orders

pub async fn create_order(State(s): State<AppState>, caller: AuthCustomer, ValidatedJson(body): ValidatedJson<NewOrder>) -> Result<(StatusCode, Json<Order>)> {
    let order = s.services.orders.create(caller.id, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn my_orders(State(s): State<AppState>, caller: AuthCustomer) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.services.orders.list_mine(caller.id).await?))
}

pub async fn my_order(State(s): State<AppState>, caller: AuthCustomer, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.services.orders.get_mine(caller.id, id).await?))
}

pub async fn cancel_my_order(State(s): State<AppState>, caller: AuthCustomer, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.services.orders.cancel_mine(caller.id, id).await?))
}

pub async fn validate_referral(State(s): State<AppState>, Path(code): Path<String>) -> Result<Json<ReferralCodeInfo>> {
    Ok(Json(s.services.referrals.describe_code(&code).await?))
}

pub async fn list_orders(State(s): State<AppState>, _admin: AdminCustomer) -> Result<Json<Vec<OrderWithCustomer>>> {
    Ok(Json(s.services.orders.list_all().await?))
}

pub async fn sales_report(State(s): State<AppState>, _admin: AdminCustomer) -> Result<Json<SalesReport>> {
    Ok(Json(s.services.analytics.sales().await?))
}

pub async fn dashboard(State(s): State<AppState>, _admin: AdminCustomer) -> Result<Json<Dashboard>> {
    Ok(Json(s.services.analytics.dashboard().await?))
}

pub async fn orders_by_referral(State(s): State<AppState>, _admin: AdminCustomer, Path(code): Path<String>) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.services.orders.list_by_referral_code(&code).await?))
}

pub async fn update_order_status(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<StatusUpdate>,
) -> Result<Json<OrderWithCustomer>> {
    Ok(Json(s.services.orders.update_status(id, body.status).await?))
}

pub async fn update_shipment(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<ShipmentUpdate>,
) -> Result<Json<OrderWithCustomer>> {
    Ok(Json(s.services.orders.update_shipment(id, body).await?))
}

// Coupons

pub async fn my_coupons(State(s): State<AppState>, caller: AuthCustomer) -> Result<Json<Vec<Coupon>>> {
    Ok(Json(s.services.coupons.list_mine(caller.id).await?))
}

pub async fn validate_coupon(State(s): State<AppState>, caller: AuthCustomer, Path(code): Path<String>) -> Result<Json<CouponCheck>> {
    Ok(Json(s.services.coupons.check(&code, caller.id).await?))
}

pub async fn list_coupons(State(s): State<AppState>, _admin: AdminCustomer) -> Result<Json<Vec<CouponWithOwner>>> {
    Ok(Json(s.services.coupons.list_all().await?))
}

pub async fn create_coupon(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    ValidatedJson(body): ValidatedJson<NewCoupon>,
) -> Result<(StatusCode, Json<Coupon>)> {
    Ok((StatusCode::CREATED, Json(s.services.coupons.create(body).await?)))
}

pub async fn get_coupon(State(s): State<AppState>, _admin: AdminCustomer, Path(id): Path<Uuid>) -> Result<Json<Coupon>> {
    Ok(Json(s.services.coupons.get(id).await?))
}

pub async fn update_coupon(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<CouponUpdate>,
) -> Result<Json<Coupon>> {
    Ok(Json(s.services.coupons.update(id, body).await?))
}

pub async fn delete_coupon(State(s): State<AppState>, _admin: AdminCustomer, Path(id): Path<Uuid>) -> Result<Json<Value>> {
    s.services.coupons.delete(id).await?;
    Ok(deleted())
}

// Referral programs

pub async fn list_referrals(State(s): State<AppState>, _admin: AdminCustomer) -> Result<Json<Vec<ReferralProgram>>> {
    Ok(Json(s.services.referrals.list().await?))
}

pub async fn create_referral(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    ValidatedJson(body): ValidatedJson<NewReferralProgram>,
) -> Result<(StatusCode, Json<ReferralProgram>)> {
    Ok((StatusCode::CREATED, Json(s.services.referrals.create(body).await?)))
}

pub async fn get_referral(State(s): State<AppState>, _admin: AdminCustomer, Path(id): Path<Uuid>) -> Result<Json<ReferralProgram>> {
    Ok(Json(s.services.referrals.get(id).await?))
}

pub async fn update_referral(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<ReferralProgramUpdate>,
) -> Result<Json<ReferralProgram>> {
    Ok(Json(s.services.referrals.update(id, body).await?))
}
