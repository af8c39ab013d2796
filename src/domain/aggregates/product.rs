//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub disclaimer: Option<String>,
    pub price: Money,
    pub stock_qty: u32,
    /// Legacy single-category reference, kept equal to the first entry of `category_ids`.
    pub category_id: Option<Uuid>,
    pub category_ids: Vec<Uuid>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(name: impl Into<String>, price: Money, stock_qty: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.into().trim().to_string(), description: None, disclaimer: None,
            price, stock_qty, category_id: None, category_ids: vec![], image_url: None,
            created_at: now, updated_at: now,
        }
    }

    pub fn has_stock(&self, qty: u32) -> bool { self.stock_qty >= qty }

    /// Replaces the category list and keeps the legacy field in step.
    pub fn assign_categories(&mut self, ids: Vec<Uuid>) {
        let mut unique = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) { unique.push(id); }
        }
        self.category_id = unique.first().copied();
        self.category_ids = unique;
        self.touch();
    }

    /// Categories used for reporting: the list, or the legacy field when the list is empty.
    pub fn effective_categories(&self) -> Vec<Uuid> {
        if self.category_ids.is_empty() { self.category_id.into_iter().collect() } else { self.category_ids.clone() }
    }

    pub fn in_category(&self, id: Uuid) -> bool {
        self.category_id == Some(id) || self.category_ids.contains(&id)
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_categories_dedupes_and_sets_legacy() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let mut p = Product::create("Mango", Money::from_cents(350), 10);
        p.assign_categories(vec![a, b, a]);
        assert_eq!(p.category_ids, vec![a, b]);
        assert_eq!(p.category_id, Some(a));
        p.assign_categories(vec![]);
        assert_eq!(p.category_id, None);
    }

    #[test]
    fn test_effective_categories_fall_back_to_legacy() {
        let legacy = Uuid::now_v7();
        let mut p = Product::create("Lime", Money::from_cents(100), 1);
        p.category_id = Some(legacy);
        assert_eq!(p.effective_categories(), vec![legacy]);
        assert!(p.in_category(legacy));
        assert!(p.has_stock(1) && !p.has_stock(2));
    }
}
