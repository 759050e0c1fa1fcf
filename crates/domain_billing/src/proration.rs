//! Pro-rata pricing of billable items
//!
//! Prices are scaled by the number of days an item is active within the
//! requested interval. All day counts are inclusive on both ends.
//!
//! # Rounding
//!
//! Period contributions are summed unrounded. Only the item total is rounded
//! to the nearest 0.05, half away from zero.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use core_kernel::money::round_to_five_cents;
use core_kernel::{DateRange, Money};

use crate::billable::{BillableItem, BillingPeriod, Pricing};
use crate::error::BillingError;

/// Computes the price of an item for the interval `[from, till]`
///
/// # Arguments
///
/// * `item` - The billable item
/// * `from` - First day of the interval
/// * `till` - Last day of the interval
///
/// # Returns
///
/// The prorated price, zero if the item is not active in the interval
///
/// # Errors
///
/// Returns `BillingError::InvalidPeriod` if `from` is after `till`.
pub fn prorate(item: &BillableItem, from: NaiveDate, till: NaiveDate) -> Result<Money, BillingError> {
    let interval = DateRange::new(from, till)?;

    let Some(active) = item.active_range() else {
        return Ok(Money::zero());
    };
    if active.start > till {
        return Ok(Money::zero());
    }

    let raw = match &item.item_type.pricing {
        Pricing::Fixed { price } => prorate_fixed(*price, &active, &interval),
        Pricing::Periods { periods } => prorate_periods(periods, &active, &interval)?,
    };
    Ok(Money::new(round_to_five_cents(raw)))
}

fn prorate_fixed(price: Money, active: &DateRange, interval: &DateRange) -> Decimal {
    let active_days = active.overlap_days(interval);
    scale(price, active_days, interval.days())
}

/// Periods are resolved for every calendar year the interval touches
fn prorate_periods(
    periods: &[BillingPeriod],
    active: &DateRange,
    interval: &DateRange,
) -> Result<Decimal, BillingError> {
    let mut total = Decimal::ZERO;

    for year in interval.years() {
        for period in periods {
            let period_range = period.resolve(year)?;
            let Some(billed) = period_range
                .intersection(interval)
                .and_then(|r| r.intersection(active))
            else {
                continue;
            };
            total += scale(period.price, billed.days(), period_range.days());
        }
    }

    Ok(total)
}

/// `price * days / total_days`, unrounded
fn scale(price: Money, days: i64, total_days: i64) -> Decimal {
    if days <= 0 || total_days <= 0 {
        return Decimal::ZERO;
    }
    price.amount() * Decimal::from(days) / Decimal::from(total_days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billable::ItemType;
    use core_kernel::{BillableItemId, ItemTypeId, MemberId, SubscriptionId};
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn subscription(price: Decimal) -> BillableItem {
        let item_type = ItemType::subscription(ItemTypeId::new(1), "Vegetables", Money::new(price));
        BillableItem::new(BillableItemId::new(1), SubscriptionId::new(1), MemberId::new(1), item_type)
    }

    fn half_year_extra() -> BillableItem {
        let periods = vec![
            BillingPeriod::new("First half", (1, 1), (6, 30), Money::new(dec!(100))).unwrap(),
            BillingPeriod::new("Second half", (7, 1), (12, 31), Money::new(dec!(200))).unwrap(),
        ];
        let item_type = ItemType::extra(ItemTypeId::new(2), "Eggs", "Eggs", periods);
        BillableItem::new(BillableItemId::new(2), SubscriptionId::new(1), MemberId::new(1), item_type)
    }

    #[test]
    fn test_full_year_subscription() {
        let item = subscription(dec!(1200)).activated(d(2018, 1, 1));
        let price = prorate(&item, d(2018, 1, 1), d(2018, 12, 31)).unwrap();
        assert_eq!(price.amount(), dec!(1200));
    }

    #[test]
    fn test_subscription_activated_mid_year() {
        let item = subscription(dec!(1200)).activated(d(2018, 7, 1));
        let price = prorate(&item, d(2018, 1, 1), d(2018, 12, 31)).unwrap();
        assert_eq!(price.amount(), dec!(604.95));
    }

    #[test]
    fn test_subscription_active_one_quarter() {
        let item = subscription(dec!(1200))
            .activated(d(2018, 4, 1))
            .deactivated(d(2018, 6, 30));
        let price = prorate(&item, d(2018, 1, 1), d(2018, 12, 31)).unwrap();
        // 91 of 365 days
        assert_eq!(price.amount(), dec!(299.20));
    }

    #[test]
    fn test_not_activated_is_free() {
        let item = subscription(dec!(1200));
        assert!(prorate(&item, d(2018, 1, 1), d(2018, 12, 31)).unwrap().is_zero());

        let item = subscription(dec!(1200)).activated(d(2019, 1, 1));
        assert!(prorate(&item, d(2018, 1, 1), d(2018, 12, 31)).unwrap().is_zero());
    }

    #[test]
    fn test_deactivated_before_interval_is_free() {
        let item = subscription(dec!(1200))
            .activated(d(2017, 1, 1))
            .deactivated(d(2017, 12, 31));
        assert!(prorate(&item, d(2018, 1, 1), d(2018, 12, 31)).unwrap().is_zero());
    }

    #[test]
    fn test_inverted_interval_is_rejected() {
        let item = subscription(dec!(1200)).activated(d(2018, 1, 1));
        let result = prorate(&item, d(2018, 12, 31), d(2018, 1, 1));
        assert!(matches!(result, Err(BillingError::InvalidPeriod(_))));
    }

    #[test]
    fn test_periods_full_year() {
        let item = half_year_extra().activated(d(2018, 1, 1));
        let price = prorate(&item, d(2018, 1, 1), d(2018, 12, 31)).unwrap();
        assert_eq!(price.amount(), dec!(300));
    }

    #[test]
    fn test_periods_single_half() {
        let item = half_year_extra().activated(d(2018, 1, 1));
        assert_eq!(prorate(&item, d(2018, 1, 1), d(2018, 6, 30)).unwrap().amount(), dec!(100));
        assert_eq!(prorate(&item, d(2018, 7, 1), d(2018, 12, 31)).unwrap().amount(), dec!(200));
    }

    #[test]
    fn test_periods_partial_interval() {
        let item = half_year_extra().activated(d(2018, 1, 1));
        // 122/181 of 100 plus 123/184 of 200
        let price = prorate(&item, d(2018, 3, 1), d(2018, 10, 31)).unwrap();
        assert_eq!(price.amount(), dec!(201.10));
    }

    #[test]
    fn test_periods_with_late_activation() {
        let item = half_year_extra().activated(d(2018, 7, 1));
        let price = prorate(&item, d(2018, 1, 1), d(2018, 12, 31)).unwrap();
        assert_eq!(price.amount(), dec!(200));
    }

    #[test]
    fn test_periods_are_rounded_once_after_summing() {
        let periods = vec![
            BillingPeriod::new("A", (1, 1), (1, 2), Money::new(dec!(0.05))).unwrap(),
            BillingPeriod::new("B", (1, 3), (1, 4), Money::new(dec!(0.05))).unwrap(),
        ];
        let item_type = ItemType::extra(ItemTypeId::new(3), "Bread", "Bread", periods);
        let item = BillableItem::new(BillableItemId::new(3), SubscriptionId::new(1), MemberId::new(1), item_type)
            .activated(d(2018, 1, 1));

        // 0.025 + 0.025, not 0.05 + 0.05
        let price = prorate(&item, d(2018, 1, 2), d(2018, 1, 3)).unwrap();
        assert_eq!(price.amount(), dec!(0.05));
    }

    #[test]
    fn test_periods_across_shifted_business_year() {
        // July to June sees the second half of 2018 and the first half of 2019
        let item = half_year_extra().activated(d(2018, 1, 1));
        let price = prorate(&item, d(2018, 7, 1), d(2019, 6, 30)).unwrap();
        assert_eq!(price.amount(), dec!(300));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::billable::ItemType;
    use core_kernel::{BillableItemId, ItemTypeId, MemberId, SubscriptionId};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn year_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap()
    }

    fn item(price_cents: i64, activation_offset: u64) -> BillableItem {
        let item_type = ItemType::subscription(ItemTypeId::new(1), "Vegetables", Money::from_cents(price_cents));
        BillableItem::new(BillableItemId::new(1), SubscriptionId::new(1), MemberId::new(1), item_type)
            .activated(year_start() + chrono::Days::new(activation_offset))
    }

    proptest! {
        #[test]
        fn prorated_price_never_exceeds_full_price(
            price_cents in 0i64..1_000_000,
            offset in 0u64..400,
        ) {
            let item = item(price_cents, offset);
            let end = NaiveDate::from_ymd_opt(2018, 12, 31).unwrap();
            let price = prorate(&item, year_start(), end).unwrap();
            prop_assert!(price.amount() >= dec!(0));
            prop_assert!(price.amount() <= Money::from_cents(price_cents).amount() + dec!(0.025));
        }

        #[test]
        fn split_intervals_add_up_within_rounding(
            price_cents in 0i64..1_000_000,
            offset in 0u64..365,
            split in 1u64..364,
        ) {
            let item = item(price_cents, offset);
            let end = NaiveDate::from_ymd_opt(2018, 12, 31).unwrap();
            let mid = year_start() + chrono::Days::new(split);

            let whole = prorate(&item, year_start(), end).unwrap();
            let first = prorate(&item, year_start(), mid - chrono::Days::new(1)).unwrap();
            let second = prorate(&item, mid, end).unwrap();

            // Each part is scaled against its own interval, so compare the
            // day-weighted parts rather than the raw sum.
            let total_days = Decimal::from(365);
            let first_days = Decimal::from((mid - year_start()).num_days());
            let second_days = total_days - first_days;
            let recombined = (first.amount() * first_days + second.amount() * second_days) / total_days;

            prop_assert!((recombined - whole.amount()).abs() <= dec!(0.05));
        }
    }
}
