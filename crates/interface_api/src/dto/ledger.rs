//! Booking, ledger and balance DTOs

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use domain_billing::{Booking, SyncOutcome};

#[derive(Debug, Deserialize)]
pub struct BookingsQuery {
    pub from: NaiveDate,
    pub till: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct LedgerSyncRequest {
    pub from: NaiveDate,
    pub till: NaiveDate,
    /// Also update ledger entries whose VAT amount differs
    #[serde(default)]
    pub compare_vat: bool,
}

#[derive(Debug, Deserialize)]
pub struct BalancesQuery {
    /// Reporting date; defaults to today
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct BookingsResponse {
    pub from: NaiveDate,
    pub till: NaiveDate,
    pub bookings: Vec<Booking>,
}

#[derive(Debug, Serialize)]
pub struct LedgerSyncResponse {
    pub complete: bool,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}
