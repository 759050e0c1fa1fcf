//! Tabular booking export
//!
//! Bookings written as CSV for import into spreadsheets or ledgers without
//! an API.

use std::io::Write;

use chrono::NaiveDate;
use csv::WriterBuilder;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::booking::Booking;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct BookingRow<'a> {
    date: NaiveDate,
    doc_number: &'a str,
    text: &'a str,
    debit_account: &'a str,
    credit_account: &'a str,
    amount: String,
    member_account: &'a str,
    vat_amount: String,
}

impl<'a> From<&'a Booking> for BookingRow<'a> {
    fn from(booking: &'a Booking) -> Self {
        Self {
            date: booking.date,
            doc_number: &booking.doc_number,
            text: &booking.text,
            debit_account: &booking.debit_account,
            credit_account: &booking.credit_account,
            amount: format_amount(booking.amount.amount()),
            member_account: &booking.member_account,
            vat_amount: format_amount(booking.vat_amount.amount()),
        }
    }
}

fn format_amount(value: Decimal) -> String {
    format!("{:.2}", value)
}

/// Writes bookings as CSV with a header row
pub fn write_bookings_csv<W: Write>(writer: W, bookings: &[Booking]) -> Result<(), ExportError> {
    let mut csv = WriterBuilder::new().has_headers(true).from_writer(writer);
    for booking in bookings {
        csv.serialize(BookingRow::from(booking))?;
    }
    csv.flush()?;
    Ok(())
}

/// Bookings as a CSV document
pub fn bookings_to_csv(bookings: &[Booking]) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_bookings_csv(&mut buffer, bookings)?;
    String::from_utf8(buffer).map_err(|e| ExportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Money;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bookings_csv() {
        let booking = Booking {
            date: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            doc_number: "500011".to_string(),
            text: "Bill 1: Subscription Test, Michael".to_string(),
            debit_account: "1100".to_string(),
            credit_account: "3001".to_string(),
            amount: Money::new(dec!(1200)),
            vat_amount: Money::new(dec!(29.27)),
            member_account: "9001".to_string(),
            external_id: None,
        };

        let csv = bookings_to_csv(&[booking]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "date,doc_number,text,debit_account,credit_account,amount,member_account,vat_amount"
        );
        assert_eq!(
            lines[1],
            "2018-01-01,500011,\"Bill 1: Subscription Test, Michael\",1100,3001,1200.00,9001,29.27"
        );
    }

    #[test]
    fn test_empty_export_has_no_rows() {
        assert!(bookings_to_csv(&[]).unwrap().is_empty());
    }
}
