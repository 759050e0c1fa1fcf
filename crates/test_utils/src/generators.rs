//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{Duration, NaiveDate};
use core_kernel::{BillId, ItemTypeId, MemberId, Money};
use domain_billing::{BillableItem, ItemType};
use proptest::prelude::*;

use crate::builders::BillableItemBuilder;

/// Largest bill id that fits the 10 reference digits reserved for it
pub const MAX_REFERENCE_BILL_ID: i64 = 9_999_999_999;

/// Largest member id that fits in front of the bill id
pub const MAX_REFERENCE_MEMBER_ID: i64 = 9_999_999_999_999_999;

/// Strategy for member ids that can be encoded in a reference
pub fn member_id_strategy() -> impl Strategy<Value = MemberId> {
    (1i64..=MAX_REFERENCE_MEMBER_ID).prop_map(MemberId::new)
}

/// Strategy for bill ids that can be encoded in a reference
pub fn bill_id_strategy() -> impl Strategy<Value = BillId> {
    (1i64..=MAX_REFERENCE_BILL_ID).prop_map(BillId::new)
}

/// Strategy for yearly prices between 0 and 10'000.00
pub fn price_strategy() -> impl Strategy<Value = Money> {
    (0i64..=1_000_000i64).prop_map(Money::from_cents)
}

/// Strategy for days of the given calendar year
pub fn date_in_year_strategy(year: i32) -> impl Strategy<Value = NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    let days = NaiveDate::from_ymd_opt(year, 12, 31).unwrap().signed_duration_since(first).num_days();
    (0..=days).prop_map(move |offset| first + Duration::days(offset))
}

/// Strategy for fixed-price subscription items activated within `year`,
/// optionally deactivated later in the same year
pub fn subscription_item_strategy(year: i32) -> impl Strategy<Value = BillableItem> {
    (
        price_strategy(),
        date_in_year_strategy(year),
        proptest::option::of(date_in_year_strategy(year)),
    )
        .prop_map(|(price, activation, deactivation)| {
            let item_type = ItemType::subscription(ItemTypeId::new(1), "Generated", price);
            let builder = BillableItemBuilder::new().of_type(item_type).activated(activation);
            match deactivation {
                Some(end) if end >= activation => builder.deactivated(end).build(),
                _ => builder.build(),
            }
        })
}
