//! Billing domain errors

use thiserror::Error;

use core_kernel::{BillId, BusinessYearId, MemberId, PortError, TemporalError};

use crate::reference::ReferenceError;

/// Errors that can occur in the billing domain
///
/// Messages are shown to the book-keeper as-is, so each one names the
/// offending account, member or payment.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Billable items passed to `create_bill` belong to several members
    #[error("Billable items belong to different members: {0:?}")]
    MixedMember(Vec<MemberId>),

    /// `create_bill` was called without any billable item
    #[error("Cannot create a bill without billable items")]
    NoBillableItems,

    /// Reference number could not be decoded
    #[error("Invalid reference number: {0}")]
    InvalidReference(#[from] ReferenceError),

    /// No payment type is configured for the credited bank account
    #[error("Payment for account iban {0} can not be imported, because there is no payment type for this account")]
    UnknownAccount(String),

    /// Decoded member id does not exist
    #[error("Payment from member {0} can not be imported, because there is no member with this id")]
    UnknownMember(i64),

    /// Member exists but has no bill the payment could be assigned to
    #[error("Payment from member {0} can not be imported, because there is no open bill for the member")]
    NoOpenBill(i64),

    /// A payment with this unique id was imported before
    #[error("Payment with unique id {0} has already been imported")]
    DuplicatePayment(String),

    /// Bill not found
    #[error("Bill not found: {0}")]
    BillNotFound(BillId),

    /// Business year not found
    #[error("Business year not found: {0}")]
    BusinessYearNotFound(BusinessYearId),

    /// Invalid date range or calendar date
    #[error("Invalid period: {0}")]
    InvalidPeriod(#[from] TemporalError),

    /// Input rejected before touching the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence or external ledger failure
    #[error(transparent)]
    Port(#[from] PortError),
}

impl BillingError {
    /// Maps a repository lookup failure for a bill
    pub(crate) fn bill_lookup(id: BillId) -> impl FnOnce(PortError) -> BillingError {
        move |e| {
            if e.is_not_found() {
                BillingError::BillNotFound(id)
            } else {
                BillingError::Port(e)
            }
        }
    }

    /// Maps a repository lookup failure for a business year
    pub(crate) fn year_lookup(id: BusinessYearId) -> impl FnOnce(PortError) -> BillingError {
        move |e| {
            if e.is_not_found() {
                BillingError::BusinessYearNotFound(id)
            } else {
                BillingError::Port(e)
            }
        }
    }

    /// Returns true if the error was caused by caller input rather than infrastructure
    pub fn is_client_error(&self) -> bool {
        !matches!(self, BillingError::Port(_))
    }
}
