use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use uuid::Uuid;
use validator::Validate;

use super::uploads::read_image_form;
use super::{deleted, AdminCustomer, AppState, ValidatedJson};
use crate::domain::aggregates::{Category, Product};
use crate::error::Result;
use crate::services::catalog::{CategoryUpdate, NewCategory, NewProduct, ProductListQuery, ProductPage, ProductUpdate};

pub async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(s.services.catalog.list_categories().await?))
}

pub async fn get_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Category>> {
    Ok(Json(s.services.catalog.get_category(id).await?))
}

pub async fn create_category(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    ValidatedJson(body): ValidatedJson<NewCategory>,
) -> Result<(StatusCode, Json<Category>)> {
    Ok((StatusCode::CREATED, Json(s.services.catalog.create_category(body).await?)))
}

pub async fn update_category(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<CategoryUpdate>,
) -> Result<Json<Category>> {
    Ok(Json(s.services.catalog.update_category(id, body).await?))
}

pub async fn delete_category(State(s): State<AppState>, _admin: AdminCustomer, Path(id): Path<Uuid>) -> Result<Json<Value>> {
    s.services.catalog.delete_category(id).await?;
    Ok(deleted())
}

pub async fn category_image(State(s): State<AppState>, _admin: AdminCustomer, Path(id): Path<Uuid>, form: Multipart) -> Result<Json<Category>> {
    let (upload, _) = read_image_form(form).await?;
    Ok(Json(s.services.catalog.attach_category_image(id, upload).await?))
}

pub async fn list_products(State(s): State<AppState>, Query(query): Query<ProductListQuery>) -> Result<Json<ProductPage>> {
    query.validate()?;
    Ok(Json(s.services.catalog.list_products(query).await?))
}

pub async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>> {
    Ok(Json(s.services.catalog.get_product(id).await?))
}

pub async fn create_product(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    ValidatedJson(body): ValidatedJson<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.services.catalog.create_product(body).await?)))
}

pub async fn update_product(
    State(s): State<AppState>,
    _admin: AdminCustomer,
    Path(id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<ProductUpdate>,
) -> Result<Json<Product>> {
    Ok(Json(s.services.catalog.update_product(id, body).await?))
}

pub async fn delete_product(State(s): State<AppState>, _admin: AdminCustomer, Path(id): Path<Uuid>) -> Result<Json<Value>> {
    s.services.catalog.delete_product(id).await?;
    Ok(deleted())
}

pub async fn product_image(State(s): State<AppState>, _admin: AdminCustomer, Path(id): Path<Uuid>, form: Multipart) -> Result<Json<Product>> {
    let (upload, _) = read_image_form(form).await?;
    Ok(Json(s.services.catalog.attach_product_image(id, upload).await?))
}
