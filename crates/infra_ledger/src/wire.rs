//! Ledger wire format and conversion to bookings
//!
//! The ledger stores bookings as manual entries. Only the first line of an
//! entry is considered, and only entries whose description carries the
//! `jb:<docnumber>` marker are treated as ours.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::Money;
use domain_billing::{Booking, LedgerDescription};

use crate::error::LedgerApiError;

/// Decimal places kept when reading amounts back from the ledger
const AMOUNT_SCALE: u32 = 4;

/// Entry type of a single debit/credit pair
pub const MANUAL_SINGLE_ENTRY: &str = "manual_single_entry";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDto {
    pub id: i64,
    pub account_no: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyDto {
    pub id: i64,
    pub name: String,
}

/// One debit/credit line of a manual entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryLine {
    pub description: String,
    pub debit_account_id: Option<i64>,
    pub credit_account_id: Option<i64>,
    pub amount: f64,
    #[serde(default)]
    pub tax_amount: Option<f64>,
    pub currency_id: Option<i64>,
    /// Some ledgers repeat the date per line; the envelope date wins when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// A manual entry envelope as listed, created and updated by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub entries: Vec<EntryLine>,
}

fn to_wire(money: Money) -> f64 {
    money.amount().to_f64().unwrap_or_default()
}

fn from_wire(value: f64) -> Money {
    Money::new(Decimal::from_f64(value).unwrap_or_default().round_dp(AMOUNT_SCALE))
}

/// Accounts and currencies of the ledger, loaded once per adapter
#[derive(Debug, Clone, Default)]
pub struct BaseData {
    account_numbers: HashMap<i64, String>,
    account_ids: HashMap<String, i64>,
    currency_ids: HashMap<String, i64>,
}

impl BaseData {
    pub fn new(accounts: Vec<AccountDto>, currencies: Vec<CurrencyDto>) -> Self {
        let mut data = Self::default();
        for account in accounts {
            data.account_ids.insert(account.account_no.clone(), account.id);
            data.account_numbers.insert(account.id, account.account_no);
        }
        data.currency_ids = currencies.into_iter().map(|c| (c.name, c.id)).collect();
        data
    }

    pub fn account_id(&self, number: &str) -> Result<i64, LedgerApiError> {
        self.account_ids
            .get(number)
            .copied()
            .ok_or_else(|| LedgerApiError::UnknownAccount(number.to_string()))
    }

    pub fn currency_id(&self, name: &str) -> Result<i64, LedgerApiError> {
        self.currency_ids
            .get(name)
            .copied()
            .ok_or_else(|| LedgerApiError::UnknownCurrency(name.to_string()))
    }

    /// Builds the manual entry for a booking
    ///
    /// # Errors
    ///
    /// Returns `UnknownAccount` / `UnknownCurrency` for numbers the ledger
    /// does not know.
    pub fn entry_for(&self, booking: &Booking, currency: &str) -> Result<ManualEntry, LedgerApiError> {
        let line = EntryLine {
            description: LedgerDescription::of(booking).to_string(),
            debit_account_id: Some(self.account_id(&booking.debit_account)?),
            credit_account_id: Some(self.account_id(&booking.credit_account)?),
            amount: to_wire(booking.amount),
            tax_amount: Some(to_wire(booking.vat_amount)),
            currency_id: Some(self.currency_id(currency)?),
            date: None,
        };
        Ok(ManualEntry {
            id: None,
            entry_type: MANUAL_SINGLE_ENTRY.to_string(),
            date: booking.date,
            entries: vec![line],
        })
    }

    /// Reads a manual entry back as a booking
    ///
    /// Returns `None` for entries outside `[from, till]`, entries without a
    /// line and entries not created by this system.
    pub fn booking_from(&self, entry: &ManualEntry, from: NaiveDate, till: NaiveDate) -> Option<Booking> {
        let line = entry.entries.first()?;
        let date = line.date.unwrap_or(entry.date);
        if date < from || date > till {
            return None;
        }
        let description = LedgerDescription::parse(&line.description)?;
        let account = |id: Option<i64>| {
            id.and_then(|id| self.account_numbers.get(&id).cloned())
                .unwrap_or_default()
        };

        Some(Booking {
            date,
            doc_number: description.doc_number,
            text: description.text,
            debit_account: account(line.debit_account_id),
            credit_account: account(line.credit_account_id),
            amount: from_wire(line.amount),
            vat_amount: from_wire(line.tax_amount.unwrap_or_default()),
            member_account: String::new(),
            external_id: entry.id.map(|id| id.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn base() -> BaseData {
        BaseData::new(
            vec![
                AccountDto { id: 10, account_no: "1100".to_string() },
                AccountDto { id: 20, account_no: "3001".to_string() },
            ],
            vec![CurrencyDto { id: 1, name: "CHF".to_string() }],
        )
    }

    fn booking() -> Booking {
        Booking {
            date: d(2018, 1, 15),
            doc_number: "500011".to_string(),
            text: "Bill 1: Subscription Michael Test".to_string(),
            debit_account: "1100".to_string(),
            credit_account: "3001".to_string(),
            amount: Money::new(dec!(1200)),
            vat_amount: Money::new(dec!(29.27)),
            member_account: "4001".to_string(),
            external_id: None,
        }
    }

    #[test]
    fn test_entry_for_booking() {
        let entry = base().entry_for(&booking(), "CHF").unwrap();
        assert_eq!(entry.entry_type, "manual_single_entry");
        assert_eq!(entry.date, d(2018, 1, 15));

        let line = &entry.entries[0];
        assert_eq!(line.description, "Bill 1: Subscription Michael Test jb:500011");
        assert_eq!(line.debit_account_id, Some(10));
        assert_eq!(line.credit_account_id, Some(20));
        assert_eq!(line.amount, 1200.0);
        assert_eq!(line.currency_id, Some(1));
    }

    #[test]
    fn test_unknown_account_or_currency() {
        let mut unknown = booking();
        unknown.credit_account = "9999".to_string();
        assert!(matches!(
            base().entry_for(&unknown, "CHF"),
            Err(LedgerApiError::UnknownAccount(a)) if a == "9999"
        ));
        assert!(matches!(
            base().entry_for(&booking(), "EUR"),
            Err(LedgerApiError::UnknownCurrency(_))
        ));
    }

    #[test]
    fn test_entry_reads_back_as_same_booking() {
        let base = base();
        let mut entry = base.entry_for(&booking(), "CHF").unwrap();
        entry.id = Some(77);

        let read = base.booking_from(&entry, d(2018, 1, 1), d(2018, 12, 31)).unwrap();
        assert!(read.same_content(&booking(), true));
        assert_eq!(read.external_id.as_deref(), Some("77"));
        assert_eq!(read.vat_amount, Money::new(dec!(29.27)));
    }

    #[test]
    fn test_foreign_and_out_of_range_entries_are_skipped() {
        let base = base();
        let mut entry = base.entry_for(&booking(), "CHF").unwrap();
        assert!(base.booking_from(&entry, d(2018, 2, 1), d(2018, 12, 31)).is_none());

        entry.entries[0].description = "Rent January".to_string();
        assert!(base.booking_from(&entry, d(2018, 1, 1), d(2018, 12, 31)).is_none());

        entry.entries.clear();
        assert!(base.booking_from(&entry, d(2018, 1, 1), d(2018, 12, 31)).is_none());
    }

    #[test]
    fn test_manual_entry_json_shape() {
        let json = r#"{
            "id": 5,
            "type": "manual_single_entry",
            "date": "2018-03-01",
            "entries": [{
                "description": "Payment Bill 1: Subscription Michael Test jb:600001",
                "debit_account_id": 10,
                "credit_account_id": 20,
                "amount": 1500.0,
                "currency_id": 1
            }]
        }"#;
        let entry: ManualEntry = serde_json::from_str(json).unwrap();
        let read = base().booking_from(&entry, d(2018, 1, 1), d(2018, 12, 31)).unwrap();
        assert_eq!(read.doc_number, "600001");
        assert_eq!(read.amount, Money::new(dec!(1500)));
        assert!(read.vat_amount.is_zero());
    }
}
