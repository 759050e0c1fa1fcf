//! Ledger booking generation
//!
//! Bills and payments are turned into double-entry bookings for export to
//! the external ledger. Bookings are never stored locally; they are
//! regenerated on every export and reconciled by document number.
//!
//! Document numbers are derived from database ids:
//!
//! ```text
//! bill item   500000 + bill_id * 10 + item_index + 1
//! payment     600000 + payment_id
//! ```
//!
//! The tenth item of a bill gets the same number as the first item of the
//! next bill, and bill 10000 reaches into the payment range. `plan_sync`
//! reports such numbers in `SyncPlan::conflicts` and leaves them out of the
//! ledger changes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use core_kernel::{DateRange, MemberId, Money, PaymentTypeId};

use crate::bill::{Bill, BillItem};
use crate::billable::Member;
use crate::error::BillingError;
use crate::payment::{Payment, PaymentType};
use crate::ports::BillingRepository;
use crate::settings::BillingSettings;

/// Document number offset for bill item bookings
pub const BILL_DOC_OFFSET: i64 = 500_000;

/// Document number offset for payment bookings
pub const PAYMENT_DOC_OFFSET: i64 = 600_000;

/// One double-entry ledger posting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub date: NaiveDate,
    pub doc_number: String,
    pub text: String,
    pub debit_account: String,
    pub credit_account: String,
    /// Always non-negative
    pub amount: Money,
    pub vat_amount: Money,
    /// Cost-center account of the member
    #[serde(default)]
    pub member_account: String,
    /// Entry id in the external ledger, set on bookings read from it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl Booking {
    /// Compares the exported content of two bookings
    ///
    /// Member account and external id are not part of the export and are
    /// ignored; the VAT amount is compared only if `compare_vat` is set.
    pub fn same_content(&self, other: &Booking, compare_vat: bool) -> bool {
        self.doc_number == other.doc_number
            && self.amount == other.amount
            && self.date == other.date
            && self.debit_account == other.debit_account
            && self.credit_account == other.credit_account
            && self.text == other.text
            && (!compare_vat || self.vat_amount == other.vat_amount)
    }

    /// Returns true if debit and credit are the same account
    ///
    /// Such bookings cannot be stored in the ledger.
    pub fn is_self_balancing(&self) -> bool {
        self.debit_account == self.credit_account
    }

    /// Negative amounts are booked as positive amounts on swapped accounts
    fn normalized(mut self) -> Self {
        if self.amount.is_negative() {
            std::mem::swap(&mut self.debit_account, &mut self.credit_account);
            self.amount = -self.amount;
            self.vat_amount = -self.vat_amount;
        }
        self
    }
}

impl PartialEq for Booking {
    fn eq(&self, other: &Self) -> bool {
        self.same_content(other, true)
    }
}

/// Builds the booking for one bill item
///
/// # Arguments
///
/// * `bill` - The bill owning the item
/// * `index` - Zero-based position of the item on the bill
/// * `item` - The item
/// * `member` - The billed member
/// * `settings` - Debtor and revenue accounts
pub fn bill_item_booking(
    bill: &Bill,
    index: usize,
    item: &BillItem,
    member: &Member,
    settings: &BillingSettings,
) -> Booking {
    Booking {
        date: bill.booking_date,
        doc_number: (BILL_DOC_OFFSET + bill.id.get() * 10 + index as i64 + 1).to_string(),
        text: format!("Bill {}: {} {}", bill.id.get(), item.item_kind(), member.display_name()),
        debit_account: settings.debtor_account.clone(),
        credit_account: settings.accounts.credit_account(&item.reference),
        amount: item.amount,
        vat_amount: item.vat_amount,
        member_account: settings.accounts.member_account(member.id),
        external_id: None,
    }
    .normalized()
}

/// Builds the booking for a payment
pub fn payment_booking(
    payment: &Payment,
    payment_type: &PaymentType,
    bill: &Bill,
    member: &Member,
    settings: &BillingSettings,
) -> Booking {
    Booking {
        date: payment.paid_date,
        doc_number: (PAYMENT_DOC_OFFSET + payment.id.get()).to_string(),
        text: format!("Payment Bill {}: {} {}", bill.id.get(), bill.item_kinds(), member.display_name()),
        debit_account: payment_type.account.clone(),
        credit_account: settings.debtor_account.clone(),
        amount: payment.amount,
        vat_amount: Money::zero(),
        member_account: settings.accounts.member_account(member.id),
        external_id: None,
    }
    .normalized()
}

/// Generates bookings from the repository
pub struct BookingGenerator {
    repository: Arc<dyn BillingRepository>,
}

impl BookingGenerator {
    pub fn new(repository: Arc<dyn BillingRepository>) -> Self {
        Self { repository }
    }

    /// Bookings for all items of bills booked within `[from, till]`
    pub async fn bill_bookings(&self, from: NaiveDate, till: NaiveDate) -> Result<Vec<Booking>, BillingError> {
        let range = DateRange::new(from, till)?;
        let settings = self.repository.settings().await?;
        let bills = self.repository.bills_booked_between(range).await?;
        let members = self.members().await?;

        let mut bookings = Vec::new();
        for bill in &bills {
            let member = lookup_member(&members, bill.member_id)?;
            bookings.extend(
                bill.items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| bill_item_booking(bill, index, item, member, &settings)),
            );
        }

        debug!(bills = bills.len(), bookings = bookings.len(), "Generated bill bookings");
        Ok(bookings)
    }

    /// Bookings for all payments made within `[from, till]`
    pub async fn payment_bookings(&self, from: NaiveDate, till: NaiveDate) -> Result<Vec<Booking>, BillingError> {
        let range = DateRange::new(from, till)?;
        let settings = self.repository.settings().await?;
        let payments = self.repository.payments_between(range).await?;
        let members = self.members().await?;
        let payment_types: HashMap<PaymentTypeId, PaymentType> = self
            .repository
            .payment_types()
            .await?
            .into_iter()
            .map(|pt| (pt.id, pt))
            .collect();

        let mut bills: HashMap<_, Bill> = HashMap::new();
        let mut bookings = Vec::with_capacity(payments.len());
        for payment in &payments {
            if !bills.contains_key(&payment.bill_id) {
                let bill = self
                    .repository
                    .bill(payment.bill_id)
                    .await
                    .map_err(BillingError::bill_lookup(payment.bill_id))?;
                bills.insert(payment.bill_id, bill);
            }
            let bill = &bills[&payment.bill_id];
            let member = lookup_member(&members, bill.member_id)?;
            let payment_type = payment_types.get(&payment.payment_type_id).ok_or_else(|| {
                BillingError::Validation(format!("Payment {} has an unknown payment type", payment.id))
            })?;
            bookings.push(payment_booking(payment, payment_type, bill, member, &settings));
        }

        debug!(payments = payments.len(), "Generated payment bookings");
        Ok(bookings)
    }

    /// Bill bookings followed by payment bookings
    pub async fn bookings(&self, from: NaiveDate, till: NaiveDate) -> Result<Vec<Booking>, BillingError> {
        let mut bookings = self.bill_bookings(from, till).await?;
        bookings.extend(self.payment_bookings(from, till).await?);
        info!(%from, %till, count = bookings.len(), "Generated bookings");
        Ok(bookings)
    }

    async fn members(&self) -> Result<HashMap<MemberId, Member>, BillingError> {
        Ok(self
            .repository
            .members()
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect())
    }
}

fn lookup_member(members: &HashMap<MemberId, Member>, id: MemberId) -> Result<&Member, BillingError> {
    members.get(&id).ok_or(BillingError::UnknownMember(id.get()))
}
