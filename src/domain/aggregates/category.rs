//! Category Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Categories seeded on startup when missing.
pub const DEFAULT_CATEGORIES: [&str; 6] = ["Desserts", "Fruit", "Energy", "Tobacco", "Party Mix", "All Products"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn create(name: impl Into<String>, description: Option<String>, image_url: Option<String>) -> Self {
        let now = Utc::now();
        Self { id: Uuid::now_v7(), name: name.into().trim().to_string(), description, image_url, created_at: now, updated_at: now }
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}
