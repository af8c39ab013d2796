//! OpenSASE Storefront
//!
//! Self-hosted storefront API for a small online shop.
//!
//! ## Features
//! - Product catalog with categories, search and image uploads
//! - Customer accounts with email verification codes
//! - Orders with stock checks, referral discounts and coupon stacking
//! - Payment reminders scheduled through QStash and delivered by a signed webhook
//! - Transactional email through EmailJS
//! - Sales reports and an admin dashboard
//! - Order events on NATS

pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod integrations;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{EcommerceError, Result};
pub use http::{router, AppState};
