//! Basket of requested lines, merged per product before pricing

use uuid::Uuid;
use crate::domain::value_objects::{Quantity, QuantityError};

#[derive(Clone, Debug, PartialEq)]
pub struct BasketLine {
    pub product_id: Uuid,
    pub quantity: Quantity,
}

/// Requested lines in first-seen order; repeated products sum their quantities.
#[derive(Clone, Debug, Default)]
pub struct Basket {
    lines: Vec<BasketLine>,
}

impl Basket {
    pub fn new() -> Self { Self::default() }

    pub fn from_requests(requests: impl IntoIterator<Item = (Uuid, i64)>) -> Result<Self, QuantityError> {
        let mut basket = Self::new();
        for (product_id, qty) in requests {
            basket.add(product_id, Quantity::new(qty)?);
        }
        Ok(basket)
    }

    pub fn add(&mut self, product_id: Uuid, quantity: Quantity) {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == product_id) {
            existing.quantity = existing.quantity.add(quantity);
        } else {
            self.lines.push(BasketLine { product_id, quantity });
        }
    }

    pub fn lines(&self) -> &[BasketLine] { &self.lines }
    pub fn product_ids(&self) -> Vec<Uuid> { self.lines.iter().map(|l| l.product_id).collect() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basket_merges_duplicates() {
        let (p1, p2) = (Uuid::now_v7(), Uuid::now_v7());
        let basket = Basket::from_requests([(p1, 2), (p2, 1), (p1, 1)]).unwrap();
        assert_eq!(basket.lines().len(), 2);
        assert_eq!(basket.lines()[0].quantity.value(), 3); // Merged
        assert_eq!(basket.product_ids(), vec![p1, p2]);
    }

    #[test]
    fn test_basket_rejects_non_positive() {
        assert_eq!(Basket::from_requests([(Uuid::now_v7(), 0)]).unwrap_err(), QuantityError::NotPositive);
        assert!(Basket::new().is_empty());
    }
}
