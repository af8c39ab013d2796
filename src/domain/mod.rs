//! Domain layer: aggregates, value objects, pricing rules and events
pub mod aggregates;
pub mod discounts;
pub mod events;
pub mod value_objects;
