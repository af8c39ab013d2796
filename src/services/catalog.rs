//! Categories and products.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::uploads::ImageUpload;
use crate::domain::aggregates::{Category, Product, DEFAULT_CATEGORIES};
use crate::domain::value_objects::Money;
use crate::error::{EcommerceError, Result};
use crate::integrations::ObjectStorage;
use crate::store::{ProductQuery, Repositories};

pub const DEFAULT_PAGE_SIZE: u32 = 24;
pub const MAX_STOCK: u32 = 1_000_000;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    #[validate(length(min = 1))]
    pub name: String,
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    #[validate(length(min = 1))]
    pub name: String,
    pub price: Decimal,
    pub category_id: Option<Uuid>,
    pub category_ids: Option<Vec<Uuid>>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub disclaimer: Option<String>,
    #[validate(range(max = 1000000))]
    pub stock_qty: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub category_id: Option<Uuid>,
    pub category_ids: Option<Vec<Uuid>>,
    #[validate(url)]
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub disclaimer: Option<String>,
    #[validate(range(max = 1000000))]
    pub stock_qty: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    pub q: Option<String>,
    pub category_id: Option<Uuid>,
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<u32>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
}

impl From<ProductListQuery> for ProductQuery {
    fn from(q: ProductListQuery) -> Self {
        Self {
            text: q.q.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            category_id: q.category_id,
            page: q.page.unwrap_or(1).max(1),
            limit: q.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 200),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

fn price(value: Decimal) -> Result<Money> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(EcommerceError::validation("price must not be negative"));
    }
    if value.scale() > 2 && value.normalize().scale() > 2 {
        return Err(EcommerceError::validation("price must have at most 2 decimal places"));
    }
    Ok(Money::new(value).round())
}

/// Explicit list wins, else the single id, else no change. Duplicates are dropped.
fn next_category_ids(category_ids: Option<Vec<Uuid>>, category_id: Option<Uuid>) -> Option<Vec<Uuid>> {
    category_ids.or_else(|| category_id.map(|id| vec![id]))
}

#[derive(Clone)]
pub struct CatalogService {
    repos: Repositories,
    storage: Arc<dyn ObjectStorage>,
}

impl CatalogService {
    pub fn new(repos: Repositories, storage: Arc<dyn ObjectStorage>) -> Self { Self { repos, storage } }

    /// Inserts any missing default category; returns how many were created.
    pub async fn ensure_default_categories(&self) -> Result<usize> {
        let mut created = 0;
        for name in DEFAULT_CATEGORIES {
            if self.repos.categories.find_category_by_name(name).await?.is_none() {
                match self.repos.categories.insert_category(&Category::create(name, None, None)).await {
                    Ok(()) => created += 1,
                    // Another instance won the race.
                    Err(EcommerceError::Conflict(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        if created > 0 {
            tracing::info!(created, "default categories seeded");
        }
        Ok(created)
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>> { self.repos.categories.list_categories().await }

    pub async fn get_category(&self, id: Uuid) -> Result<Category> {
        self.repos.categories.get_category(id).await?.ok_or(EcommerceError::NotFound("Category"))
    }

    pub async fn create_category(&self, input: NewCategory) -> Result<Category> {
        let category = Category::create(input.name, input.description, input.image_url);
        self.ensure_unique_name(&category).await?;
        self.repos.categories.insert_category(&category).await.map_err(duplicate_name)?;
        tracing::info!(category_id = %category.id, name = %category.name, "category created");
        Ok(category)
    }

    pub async fn update_category(&self, id: Uuid, input: CategoryUpdate) -> Result<Category> {
        let mut category = self.get_category(id).await?;
        if let Some(name) = input.name { category.name = name.trim().to_string(); }
        if input.description.is_some() { category.description = input.description; }
        if input.image_url.is_some() { category.image_url = input.image_url; }
        category.touch();
        self.ensure_unique_name(&category).await?;
        self.repos.categories.update_category(&category).await.map_err(duplicate_name)?;
        Ok(category)
    }

    pub async fn delete_category(&self, id: Uuid) -> Result<()> {
        if !self.repos.categories.delete_category(id).await? {
            return Err(EcommerceError::NotFound("Category"));
        }
        tracing::info!(category_id = %id, "category deleted");
        Ok(())
    }

    pub async fn attach_category_image(&self, id: Uuid, upload: ImageUpload) -> Result<Category> {
        let mut category = self.get_category(id).await?;
        upload.check()?;
        let stored = self.storage.put_object(upload.bytes, &upload.file_name, &upload.content_type, Some("categories".into())).await?;
        category.image_url = Some(stored.file_url);
        category.touch();
        self.repos.categories.update_category(&category).await?;
        Ok(category)
    }

    async fn ensure_unique_name(&self, category: &Category) -> Result<()> {
        match self.repos.categories.find_category_by_name(&category.name).await? {
            Some(existing) if existing.id != category.id => Err(EcommerceError::validation("Category name already exists")),
            _ => Ok(()),
        }
    }

    pub async fn list_products(&self, query: ProductListQuery) -> Result<ProductPage> {
        let query = ProductQuery::from(query);
        let (items, total) = self.repos.products.search_products(&query).await?;
        Ok(ProductPage { items, page: query.page, limit: query.limit, total })
    }

    pub async fn get_product(&self, id: Uuid) -> Result<Product> {
        self.repos.products.get_product(id).await?.ok_or(EcommerceError::NotFound("Product"))
    }

    pub async fn create_product(&self, input: NewProduct) -> Result<Product> {
        let mut product = Product::create(input.name, price(input.price)?, input.stock_qty.unwrap_or(0).min(MAX_STOCK));
        product.description = input.description;
        product.disclaimer = input.disclaimer;
        product.image_url = input.image_url;

        let ids: Vec<Uuid> = input.category_id.into_iter().chain(input.category_ids.unwrap_or_default()).collect();
        if !ids.is_empty() {
            self.check_categories_exist(&ids).await?;
            product.assign_categories(ids);
        }

        self.repos.products.insert_product(&product).await?;
        tracing::info!(product_id = %product.id, name = %product.name, "product created");
        Ok(product)
    }

    pub async fn update_product(&self, id: Uuid, input: ProductUpdate) -> Result<Product> {
        let mut product = self.get_product(id).await?;
        if let Some(name) = input.name { product.name = name.trim().to_string(); }
        if let Some(value) = input.price { product.price = price(value)?; }
        if let Some(stock) = input.stock_qty { product.stock_qty = stock; }
        if input.description.is_some() { product.description = input.description; }
        if input.disclaimer.is_some() { product.disclaimer = input.disclaimer; }
        if input.image_url.is_some() { product.image_url = input.image_url; }

        if let Some(ids) = next_category_ids(input.category_ids, input.category_id) {
            self.check_categories_exist(&ids).await?;
            product.assign_categories(ids);
        }

        product.touch();
        self.repos.products.update_product(&product).await?;
        Ok(product)
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        if !self.repos.products.delete_product(id).await? {
            return Err(EcommerceError::NotFound("Product"));
        }
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    pub async fn attach_product_image(&self, id: Uuid, upload: ImageUpload) -> Result<Product> {
        let mut product = self.get_product(id).await?;
        upload.check()?;
        let stored = self.storage.put_object(upload.bytes, &upload.file_name, &upload.content_type, Some("products".into())).await?;
        product.image_url = Some(stored.file_url);
        product.touch();
        self.repos.products.update_product(&product).await?;
        Ok(product)
    }

    async fn check_categories_exist(&self, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            if self.repos.categories.get_category(*id).await?.is_none() {
                return Err(EcommerceError::validation("One or more categoryIds do not exist"));
            }
        }
        Ok(())
    }
}

fn duplicate_name(error: EcommerceError) -> EcommerceError {
    match error {
        EcommerceError::Conflict(_) => EcommerceError::validation("Category name already exists"),
        other => other,
    }
}
