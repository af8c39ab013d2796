//! Aggregates module
pub mod cart;
pub mod category;
pub mod coupon;
pub mod customer;
pub mod order;
pub mod product;
pub mod referral;
pub mod verification;

pub use cart::{Basket, BasketLine};
pub use category::{Category, DEFAULT_CATEGORIES};
pub use coupon::{Coupon, CouponRejection};
pub use customer::{Customer, CustomerProfile, ShippingAddress};
pub use order::{CouponUsage, Order, OrderError, OrderItem, OrderStatus, ReferralUsage, ShippingSnapshot};
pub use product::Product;
pub use referral::{DiscountType, ReferralProgram};
pub use verification::EmailVerification;
