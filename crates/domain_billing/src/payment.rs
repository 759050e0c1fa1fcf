//! Payment import
//!
//! Bank payments arrive as pre-parsed [`PaymentRecord`]s. Each record is
//! matched to a bill through its reference number:
//!
//! ```text
//! RECEIVED ──check──▶ MATCHED_EXACT     reference names an existing bill of the member
//!                 ├─▶ MATCHED_FALLBACK  newest unpaid bill of the member
//!                 └─▶ REJECTED          unknown account / member, bad checksum, no open bill
//! ```
//!
//! A batch is imported all-or-nothing: every record is checked before the
//! first write, and all payments are stored in a single unit of work.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use core_kernel::{BillId, MemberId, Money, PaymentId, PaymentTypeId, PortError};

use crate::bill::Bill;
use crate::error::BillingError;
use crate::ports::BillingRepository;
use crate::reference::{compact, StructuredReference};

/// A bank account payments are received on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentType {
    pub id: PaymentTypeId,
    pub name: String,
    pub iban: String,
    /// Ledger account debited by payments of this type
    pub account: String,
}

impl PaymentType {
    pub fn new(
        id: PaymentTypeId,
        name: impl Into<String>,
        iban: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            iban: iban.into(),
            account: account.into(),
        }
    }

    /// Compares IBANs ignoring grouping spaces and case
    fn receives_on(&self, iban: &str) -> bool {
        compact(&self.iban).eq_ignore_ascii_case(&compact(iban))
    }
}

/// A payment as read from a bank statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub date: NaiveDate,
    /// IBAN of the credited account
    pub credit_account: String,
    pub amount: Money,
    /// Reference scheme reported by the bank, e.g. "QRR"
    pub reference_type: String,
    pub reference: String,
    /// Bank-assigned id, unique over all statements
    pub unique_id: String,
}

/// How a payment was assigned to its bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    /// The reference named a bill of the paying member
    Exact,
    /// Assigned to the newest unpaid bill of the member
    Fallback,
}

/// A record that passed the checks and the bill it will be booked on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMatch {
    pub record: PaymentRecord,
    pub outcome: MatchOutcome,
    pub member_id: MemberId,
    pub bill_id: BillId,
    pub payment_type_id: PaymentTypeId,
}

impl PaymentMatch {
    fn to_new_payment(&self) -> NewPayment {
        NewPayment {
            bill_id: self.bill_id,
            payment_type_id: self.payment_type_id,
            amount: self.record.amount,
            paid_date: self.record.date,
            unique_id: self.record.unique_id.clone(),
        }
    }
}

/// A payment that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayment {
    pub bill_id: BillId,
    pub payment_type_id: PaymentTypeId,
    pub amount: Money,
    pub paid_date: NaiveDate,
    pub unique_id: String,
}

/// A stored payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub bill_id: BillId,
    pub payment_type_id: PaymentTypeId,
    pub amount: Money,
    pub paid_date: NaiveDate,
    pub unique_id: String,
}

impl Payment {
    pub fn from_new(id: PaymentId, payment: NewPayment) -> Self {
        Self {
            id,
            bill_id: payment.bill_id,
            payment_type_id: payment.payment_type_id,
            amount: payment.amount,
            paid_date: payment.paid_date,
            unique_id: payment.unique_id,
        }
    }
}

/// Total of the payments recorded against a bill
pub fn amount_paid(payments: &[Payment]) -> Money {
    payments.iter().map(|p| p.amount).sum()
}

/// Checks and imports bank payments
pub struct PaymentProcessor {
    repository: Arc<dyn BillingRepository>,
}

impl PaymentProcessor {
    pub fn new(repository: Arc<dyn BillingRepository>) -> Self {
        Self { repository }
    }

    /// Checks whether a single payment can be imported
    ///
    /// # Returns
    ///
    /// The bill the payment would be assigned to and how it was found
    ///
    /// # Errors
    ///
    /// * `UnknownAccount` - no payment type for the credited IBAN
    /// * `InvalidReference` - the reference does not decode
    /// * `UnknownMember` - the decoded member does not exist
    /// * `NoOpenBill` - neither the referenced bill nor an unpaid one exists
    pub async fn check_payment(&self, record: &PaymentRecord) -> Result<PaymentMatch, BillingError> {
        let payment_types = self.repository.payment_types().await?;
        self.check_with(&payment_types, record).await
    }

    /// Checks every record of a batch independently
    pub async fn check_payments(
        &self,
        records: &[PaymentRecord],
    ) -> Result<Vec<Result<PaymentMatch, BillingError>>, BillingError> {
        let payment_types = self.repository.payment_types().await?;
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.check_with(&payment_types, record).await);
        }
        Ok(results)
    }

    /// Imports a batch of payments, all or nothing
    ///
    /// Every record is checked before anything is written. Payments are then
    /// stored in one unit of work, and every bill that received a payment
    /// has its paid flag recomputed before commit.
    ///
    /// # Errors
    ///
    /// The first check failure, or `DuplicatePayment` if a unique id was
    /// imported before or appears twice in the batch. Nothing is stored in
    /// either case.
    pub async fn process_payments(&self, records: &[PaymentRecord]) -> Result<Vec<PaymentMatch>, BillingError> {
        let payment_types = self.repository.payment_types().await?;

        let mut seen = HashSet::new();
        let mut matches = Vec::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.unique_id.as_str()) {
                warn!(unique_id = %record.unique_id, "Duplicate unique id within batch");
                return Err(BillingError::DuplicatePayment(record.unique_id.clone()));
            }
            matches.push(self.check_with(&payment_types, record).await?);
        }

        let mut uow = self.repository.begin().await?;
        let mut touched = BTreeSet::new();
        for matched in &matches {
            match uow.insert_payment(matched.to_new_payment()).await {
                Ok(payment) => {
                    debug!(payment_id = %payment.id, bill_id = %payment.bill_id, "Payment stored");
                    touched.insert(payment.bill_id);
                }
                Err(e) => {
                    uow.rollback().await?;
                    return Err(match e {
                        PortError::Duplicate { .. } => {
                            warn!(unique_id = %matched.record.unique_id, "Payment already imported");
                            BillingError::DuplicatePayment(matched.record.unique_id.clone())
                        }
                        other => BillingError::Port(other),
                    });
                }
            }
        }

        for bill_id in touched {
            let mut bill = uow.bill(bill_id).await?;
            let payments = uow.payments_for_bill(bill_id).await?;
            bill.refresh_paid(&payments.iter().map(|p| p.amount).collect::<Vec<_>>());
            uow.update_bill(&bill).await?;
        }

        uow.commit().await?;
        info!(count = matches.len(), "Payments imported");
        Ok(matches)
    }

    async fn check_with(
        &self,
        payment_types: &[PaymentType],
        record: &PaymentRecord,
    ) -> Result<PaymentMatch, BillingError> {
        let payment_type = payment_types
            .iter()
            .find(|pt| pt.receives_on(&record.credit_account))
            .ok_or_else(|| BillingError::UnknownAccount(record.credit_account.clone()))?;

        let reference = StructuredReference::decode(&record.reference)?;
        let member_id = reference.member_id;

        match self.repository.member(member_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Err(BillingError::UnknownMember(member_id.get())),
            Err(e) => return Err(e.into()),
        }

        let (outcome, bill_id) = match self.repository.bill(reference.bill_id).await {
            Ok(bill) if bill.member_id == member_id => (MatchOutcome::Exact, bill.id),
            Ok(_) => self.fallback_bill(member_id).await?,
            Err(e) if e.is_not_found() => self.fallback_bill(member_id).await?,
            Err(e) => return Err(e.into()),
        };

        debug!(
            unique_id = %record.unique_id,
            member_id = %member_id,
            bill_id = %bill_id,
            outcome = ?outcome,
            "Payment matched"
        );

        Ok(PaymentMatch {
            record: record.clone(),
            outcome,
            member_id,
            bill_id,
            payment_type_id: payment_type.id,
        })
    }

    async fn fallback_bill(&self, member_id: MemberId) -> Result<(MatchOutcome, BillId), BillingError> {
        let bills = self.repository.bills_for_member(member_id).await?;
        newest_unpaid(&bills)
            .map(|bill| (MatchOutcome::Fallback, bill.id))
            .ok_or(BillingError::NoOpenBill(member_id.get()))
    }
}

/// The unpaid bill with the latest bill date; ties go to the higher id
fn newest_unpaid(bills: &[Bill]) -> Option<&Bill> {
    bills
        .iter()
        .filter(|bill| !bill.paid)
        .max_by_key(|bill| (bill.bill_date, bill.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::NewBill;
    use core_kernel::{BusinessYearId, Rate};
    use rust_decimal_macros::dec;

    fn bill(id: i64, date: NaiveDate, paid: bool) -> Bill {
        let mut bill = Bill::from_new(
            BillId::new(id),
            NewBill {
                member_id: MemberId::new(1),
                business_year_id: BusinessYearId::new(1),
                bill_date: date,
                booking_date: date,
                vat_rate: Rate::zero(),
            },
        );
        bill.paid = paid;
        bill
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_newest_unpaid_bill() {
        let bills = vec![
            bill(1, d(2017, 1, 1), false),
            bill(2, d(2018, 1, 1), false),
            bill(3, d(2019, 1, 1), true),
        ];
        assert_eq!(newest_unpaid(&bills).unwrap().id, BillId::new(2));
        assert!(newest_unpaid(&[bill(1, d(2017, 1, 1), true)]).is_none());
    }

    #[test]
    fn test_payment_type_iban_matching() {
        let pt = PaymentType::new(PaymentTypeId::new(1), "Bank", "CH44 3199 9123 0008 8901 2", "1010");
        assert!(pt.receives_on("CH4431999123000889012"));
        assert!(pt.receives_on("ch44 3199 9123 0008 8901 2"));
        assert!(!pt.receives_on("CH9300762011623852957"));
    }

    #[test]
    fn test_amount_paid() {
        let payment = |id: i64, amount| Payment {
            id: PaymentId::new(id),
            bill_id: BillId::new(1),
            payment_type_id: PaymentTypeId::new(1),
            amount: Money::new(amount),
            paid_date: d(2018, 2, 1),
            unique_id: format!("P{id}"),
        };
        let payments = vec![payment(1, dec!(500)), payment(2, dec!(-50))];
        assert_eq!(amount_paid(&payments).amount(), dec!(450));
    }
}
