//! Unit tests for the Money and Rate types
//!
//! Tests cover creation, arithmetic, the two rounding conventions used in
//! billing and VAT extraction.

use core_kernel::{Money, Rate};
use core_kernel::money::round_to_five_cents;
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_new_rounds_to_four_decimal_places() {
        let m = Money::new(dec!(100.123456789));
        assert_eq!(m.amount(), dec!(100.1235));
    }

    #[test]
    fn test_zero_is_zero() {
        assert!(Money::zero().is_zero());
        assert!(!Money::zero().is_positive());
        assert!(!Money::zero().is_negative());
    }

    #[test]
    fn test_negative_amount_creation() {
        let m = Money::new(dec!(-100.00));
        assert!(m.is_negative());
        assert_eq!((-m).amount(), dec!(100.00));
    }
}

mod rounding {
    use super::*;

    #[test]
    fn test_round_to_cents_half_away_from_zero() {
        assert_eq!(Money::new(dec!(1.005)).round_to_cents().amount(), dec!(1.01));
        assert_eq!(Money::new(dec!(-1.005)).round_to_cents().amount(), dec!(-1.01));
    }

    #[test]
    fn test_round_to_five_cents_steps() {
        assert_eq!(round_to_five_cents(dec!(67.4033)), dec!(67.40));
        assert_eq!(round_to_five_cents(dec!(133.6957)), dec!(133.70));
        assert_eq!(round_to_five_cents(dec!(0.074)), dec!(0.05));
        assert_eq!(round_to_five_cents(dec!(0.075)), dec!(0.10));
    }

    #[test]
    fn test_money_round_to_five_cents() {
        let m = Money::new(dec!(604.9315)).round_to_five_cents();
        assert_eq!(m.to_string(), "604.95");
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_add_assign() {
        let mut total = Money::zero();
        total += Money::new(dec!(2.50));
        total += Money::new(dec!(-0.50));
        assert_eq!(total.amount(), dec!(2.00));
    }
}

mod rates {
    use super::*;

    #[test]
    fn test_rate_display() {
        let rate = Rate::new(dec!(0.025));
        assert_eq!(rate.as_decimal(), dec!(0.025));
        assert_eq!(rate.to_string(), "2.5%");
        assert_eq!(Rate::new(dec!(0.077)).to_string(), "7.7%");
    }

    #[test]
    fn test_included_vat_on_negative_amount() {
        let rate = Rate::new(dec!(0.025));
        assert_eq!(rate.included_in(&Money::new(dec!(-1200))).amount(), dec!(-29.27));
    }
}
