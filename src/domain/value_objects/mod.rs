//! Value Objects for the storefront

use rand::RngCore;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monetary amount in the store currency, kept at two decimal places.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount) }

    /// Builds an amount from whole cents, e.g. `from_cents(1999)` is 19.99.
    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }

    pub fn amount(&self) -> Decimal { self.0 }

    /// Rounds half away from zero to two decimal places.
    pub fn round(self) -> Self {
        Self(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn floor_zero(self) -> Self { if self.0.is_sign_negative() { Self::ZERO } else { self } }

    pub fn min(self, other: Money) -> Self { if other.0 < self.0 { other } else { self } }

    pub fn multiply(&self, qty: u32) -> Money { Money(self.0 * Decimal::from(qty)) }

    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
}

impl std::ops::Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl std::ops::Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, |acc, m| acc + m) }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self { Self(value) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// Quantity of a single line, always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value <= 0 { return Err(QuantityError::NotPositive); }
        u32::try_from(value).map(Self).map_err(|_| QuantityError::TooLarge)
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0)) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { NotPositive, TooLarge }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::NotPositive => write!(f, "Invalid qty"), Self::TooLarge => write!(f, "Quantity too large") }
    }
}

/// Short random public identifier: 4 random bytes rendered as 8 hex characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicCode(String);

impl PublicCode {
    /// Lower-case form, used for public order ids.
    pub fn random_lower() -> Self { Self(random_hex()) }

    /// Upper-case form, used for coupon and referral codes.
    pub fn random_upper() -> Self { Self(random_hex().to_uppercase()) }

    /// Normalises a user-supplied coupon or referral code. Blank input yields `None`.
    pub fn normalize(raw: &str) -> Option<Self> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() { None } else { Some(Self(code)) }
    }

    /// Rebuilds a code read back from storage, keeping its case.
    pub(crate) fn from_stored(value: String) -> Self { Self(value) }

    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }
}

fn random_hex() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl fmt::Display for PublicCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Email address normalised to lower case without surrounding whitespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let value = raw.trim().to_lowercase();
        if value.is_empty() { return Err(EmailError::Empty); }
        if !value.contains('@') { return Err(EmailError::Malformed); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_string(self) -> String { self.0 }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum EmailError { Empty, Malformed }
impl std::error::Error for EmailError {}
impl fmt::Display for EmailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "Email is required"), Self::Malformed => write!(f, "Email is invalid") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_rounding() {
        assert_eq!(Money::new(Decimal::new(10005, 3)).round(), Money::from_cents(1001));
        assert_eq!(Money::new(Decimal::new(-5, 0)).floor_zero(), Money::ZERO);
        assert_eq!(Money::from_cents(1999).to_string(), "19.99");
    }

    #[test]
    fn test_quantity() {
        assert_eq!(Quantity::new(0), Err(QuantityError::NotPositive));
        assert_eq!(Quantity::new(3).unwrap().add(Quantity::new(2).unwrap()).value(), 5);
    }

    #[test]
    fn test_public_codes() {
        let order_id = PublicCode::random_lower();
        assert_eq!(order_id.as_str().len(), 8);
        assert!(order_id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(PublicCode::normalize("  ab12cd34 ").unwrap().as_str(), "AB12CD34");
        assert!(PublicCode::normalize("   ").is_none());
    }

    #[test]
    fn test_email() {
        assert_eq!(EmailAddress::parse(" Jane@Example.COM ").unwrap().as_str(), "jane@example.com");
        assert_eq!(EmailAddress::parse(""), Err(EmailError::Empty));
    }
}
