//! Discount composition: referral program first, then coupons in caller order.

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{DiscountType, ReferralProgram};
use crate::domain::value_objects::Money;

/// A validated coupon waiting to be priced.
#[derive(Clone, Debug, PartialEq)]
pub struct CouponInput {
    pub coupon_id: Uuid,
    pub code: String,
    pub value: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    pub coupon_id: Uuid,
    pub code: String,
    pub value: Money,
    pub discount: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountBreakdown {
    pub subtotal: Money,
    pub referral: Money,
    pub coupons: Vec<AppliedCoupon>,
    pub coupon_total: Money,
    pub discount_amount: Money,
    pub total: Money,
}

pub fn referral_discount(program: &ReferralProgram, subtotal: Money) -> Money {
    let value = program.effective_value();
    let raw = match program.discount_type {
        DiscountType::Percent => Money::new(subtotal.amount() * value / Decimal::ONE_HUNDRED),
        DiscountType::Amount => Money::new(value),
    };
    raw.round().min(subtotal).floor_zero()
}

/// Each coupon takes at most what is left after the prior discount and earlier coupons.
pub fn stack_coupons(subtotal: Money, prior: Money, coupons: &[CouponInput]) -> Vec<AppliedCoupon> {
    let mut running = Money::ZERO;
    coupons
        .iter()
        .map(|c| {
            let remaining = (subtotal - prior - running).floor_zero();
            let discount = remaining.min(c.value.floor_zero()).round();
            running = (running + discount).round();
            AppliedCoupon { coupon_id: c.coupon_id, code: c.code.clone(), value: c.value, discount }
        })
        .collect()
}

pub fn compose(subtotal: Money, referral: Option<&ReferralProgram>, coupons: &[CouponInput]) -> DiscountBreakdown {
    let referral = referral.map_or(Money::ZERO, |p| referral_discount(p, subtotal));
    let applied = stack_coupons(subtotal, referral, coupons);
    let coupon_total = applied.iter().map(|a| a.discount).sum::<Money>().round();
    let discount_amount = (referral + coupon_total).round().min(subtotal);
    let total = (subtotal - discount_amount).round().floor_zero();
    DiscountBreakdown { subtotal, referral, coupons: applied, coupon_total, discount_amount, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coupon(cents: i64) -> CouponInput {
        CouponInput { coupon_id: Uuid::now_v7(), code: "C0FFEE00".into(), value: Money::from_cents(cents) }
    }

    fn program(discount_type: DiscountType, value: Decimal) -> ReferralProgram {
        ReferralProgram::create("Friends", discount_type, value, true)
    }

    #[test]
    fn test_ten_percent_referral() {
        let p = program(DiscountType::Percent, Decimal::new(10, 0));
        let b = compose(Money::from_cents(10000), Some(&p), &[]);
        assert_eq!(b.discount_amount, Money::from_cents(1000));
        assert_eq!(b.total, Money::from_cents(9000));
    }

    #[test]
    fn test_fixed_referral_capped_at_subtotal() {
        let p = program(DiscountType::Amount, Decimal::new(80, 0));
        assert_eq!(referral_discount(&p, Money::from_cents(5000)), Money::from_cents(5000));
    }

    #[test]
    fn test_two_coupons_exhaust_subtotal() {
        let b = compose(Money::from_cents(5000), None, &[coupon(2000), coupon(4000)]);
        assert_eq!(b.coupons[0].discount, Money::from_cents(2000));
        assert_eq!(b.coupons[1].discount, Money::from_cents(3000));
        assert_eq!(b.discount_amount, Money::from_cents(5000));
        assert_eq!(b.total, Money::ZERO);
    }

    #[test]
    fn test_coupons_after_referral() {
        let p = program(DiscountType::Percent, Decimal::new(50, 0));
        let b = compose(Money::from_cents(1000), Some(&p), &[coupon(300), coupon(300)]);
        assert_eq!(b.referral, Money::from_cents(500));
        assert_eq!(b.coupons[1].discount, Money::from_cents(200));
        assert_eq!(b.coupon_total, Money::from_cents(500));
        assert_eq!(b.total, Money::ZERO);
    }

    #[test]
    fn test_percent_rounds_to_cents() {
        let p = program(DiscountType::Percent, Decimal::new(15, 0));
        assert_eq!(referral_discount(&p, Money::from_cents(3333)), Money::from_cents(500));
    }

    proptest! {
        #[test]
        fn total_matches_subtotal_minus_discount(
            subtotal in 0i64..1_000_000,
            pct in 0i64..150,
            values in proptest::collection::vec(0i64..50_000, 0..=3),
        ) {
            let p = program(DiscountType::Percent, Decimal::new(pct, 0));
            let coupons: Vec<_> = values.iter().map(|v| coupon(*v)).collect();
            let subtotal = Money::from_cents(subtotal);
            let b = compose(subtotal, Some(&p), &coupons);
            prop_assert!(b.discount_amount <= subtotal);
            prop_assert_eq!(b.total, (subtotal - b.discount_amount).round().floor_zero());
        }

        #[test]
        fn coupons_take_min_of_remaining_and_value(
            subtotal in 0i64..100_000,
            prior in 0i64..100_000,
            values in proptest::collection::vec(0i64..50_000, 1..=3),
        ) {
            let subtotal = Money::from_cents(subtotal);
            let prior = Money::from_cents(prior).min(subtotal);
            let coupons: Vec<_> = values.iter().map(|v| coupon(*v)).collect();
            let applied = stack_coupons(subtotal, prior, &coupons);
            let mut used = Money::ZERO;
            for (a, c) in applied.iter().zip(&coupons) {
                prop_assert_eq!(a.discount, (subtotal - prior - used).floor_zero().min(c.value));
                used = used + a.discount;
            }
        }
    }
}
