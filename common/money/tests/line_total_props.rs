use bigdecimal::BigDecimal;
use common_money::{line_total, normalize_scale, Money};
use proptest::prelude::*;
use std::str::FromStr;

proptest! {
    // Normalization is idempotent: a value already at scale 2 passes through unchanged.
    #[test]
    fn normalize_idempotent(cents in -1_000_000i64..1_000_000) {
        let s = format!("{}.{:02}", cents / 100, (cents % 100).abs());
        let bd = BigDecimal::from_str(&s).unwrap();
        let once = normalize_scale(&bd);
        let twice = normalize_scale(&once);
        prop_assert_eq!(once, twice);
    }

    // Line totals always land on scale 2 regardless of the unit price's scale.
    #[test]
    fn line_total_scale_two(qty in 1i32..10_000, millis in 0i64..1_000_000) {
        let price = BigDecimal::from_str(&format!("{}.{:03}", millis / 1000, millis % 1000)).unwrap();
        let total = line_total(qty, &price);
        prop_assert_eq!(&total, &total.with_scale(2), "total {} exceeds scale 2", total);
    }

    // quantity * normalized price never produces a negative total for non-negative inputs.
    #[test]
    fn line_total_non_negative(qty in 1i32..10_000, cents in 0i64..1_000_000) {
        let price = Money::new(BigDecimal::from(cents) / BigDecimal::from(100));
        let total = price.line_total(qty);
        prop_assert!(!total.is_negative(), "total {:?} went negative", total);
    }

    // Multiplying by 1 is the identity on already-normalized prices.
    #[test]
    fn line_total_identity(cents in 0i64..1_000_000) {
        let price = Money::new(BigDecimal::from(cents) / BigDecimal::from(100));
        prop_assert_eq!(price.line_total(1), price);
    }
}
