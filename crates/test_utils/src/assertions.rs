//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for domain types that give
//! more meaningful error messages than standard assertions.

use std::collections::{BTreeMap, HashSet};

use core_kernel::Money;
use domain_billing::bill::vat_for;
use domain_billing::{Bill, Booking};
use rust_decimal::Decimal;

/// Asserts that a Money value has exactly the expected amount
pub fn assert_money_eq(actual: Money, expected: Decimal) {
    assert_eq!(
        actual.amount(),
        expected,
        "Expected amount {}, got {}",
        expected,
        actual.amount()
    );
}

/// Asserts the derived values of a bill
///
/// # Panics
///
/// Panics if the bill amount differs from the sum of its items or an item's
/// VAT share differs from the one computed at the bill's rate.
pub fn assert_bill_consistent(bill: &Bill) {
    let total: Money = bill.items.iter().map(|item| item.amount).sum();
    assert_eq!(
        bill.amount, total,
        "Bill {} amount {} differs from item total {}",
        bill.id, bill.amount, total
    );

    for item in &bill.items {
        let expected = vat_for(&item.reference, item.amount, bill.vat_rate);
        assert_eq!(
            item.vat_amount, expected,
            "Item {} of bill {} has VAT {}, expected {}",
            item.id, bill.id, item.vat_amount, expected
        );
    }
}

/// Asserts that no two bookings share a document number
pub fn assert_unique_doc_numbers(bookings: &[Booking]) {
    let mut seen = HashSet::new();
    for booking in bookings {
        assert!(
            seen.insert(booking.doc_number.as_str()),
            "Document number {} appears more than once",
            booking.doc_number
        );
    }
}

/// Asserts that the ledger holds exactly the expected bookings
///
/// Bookings are compared by document number and content, ignoring the
/// ledger's entry ids. Self-balancing bookings are never stored, so they
/// are left out of `expected`.
pub fn assert_ledger_matches(ledger: &[Booking], expected: &[Booking]) {
    assert_unique_doc_numbers(ledger);

    let stored: BTreeMap<&str, &Booking> = ledger.iter().map(|b| (b.doc_number.as_str(), b)).collect();
    let wanted: BTreeMap<&str, &Booking> = expected
        .iter()
        .filter(|b| !b.is_self_balancing())
        .map(|b| (b.doc_number.as_str(), b))
        .collect();

    assert_eq!(
        stored.keys().collect::<Vec<_>>(),
        wanted.keys().collect::<Vec<_>>(),
        "Ledger document numbers differ from generated bookings"
    );
    for (doc, booking) in &wanted {
        assert!(
            stored[doc].same_content(booking, true),
            "Ledger booking {} differs: {:?} vs {:?}",
            doc,
            stored[doc],
            booking
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_assert_money_eq_passes() {
        assert_money_eq(Money::new(dec!(604.95)), dec!(604.95));
    }

    #[test]
    #[should_panic(expected = "Expected amount")]
    fn test_assert_money_eq_fails() {
        assert_money_eq(Money::new(dec!(604.90)), dec!(604.95));
    }

    #[test]
    #[should_panic(expected = "appears more than once")]
    fn test_duplicate_doc_numbers_detected() {
        let booking = Booking {
            date: chrono::NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            doc_number: "500011".to_string(),
            text: "Bill 1: Subscription Michael Test".to_string(),
            debit_account: "1100".to_string(),
            credit_account: "3001".to_string(),
            amount: Money::new(dec!(1200)),
            vat_amount: Money::zero(),
            member_account: String::new(),
            external_id: None,
        };
        assert_unique_doc_numbers(&[booking.clone(), booking]);
    }
}
