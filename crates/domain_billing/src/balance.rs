//! Member balances
//!
//! What each member owes at a given date: published bills booked up to that
//! date minus payments received up to that date.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use core_kernel::{BillId, DateRange, MemberId, Money};

use crate::error::BillingError;
use crate::ports::BillingRepository;

/// Billed and paid totals of one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberBalance {
    pub member_id: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub billed: Money,
    pub paid: Money,
    /// Billed minus paid; negative when the member paid too much
    pub balance: Money,
}

/// Computes member balances from bills and payments
pub struct BalanceReport {
    repository: Arc<dyn BillingRepository>,
}

impl BalanceReport {
    pub fn new(repository: Arc<dyn BillingRepository>) -> Self {
        Self { repository }
    }

    /// Balances of all members with a bill or payment up to `as_of`
    ///
    /// Unpublished bills are not billed yet, but payments against them
    /// count. The result is sorted by last name, then first name.
    pub async fn member_balances(&self, as_of: NaiveDate) -> Result<Vec<MemberBalance>, BillingError> {
        let bills = self
            .repository
            .bills_booked_between(DateRange::open(None, None))
            .await?;
        let payments = self
            .repository
            .payments_between(DateRange::open(None, Some(as_of)))
            .await?;

        let owner: HashMap<BillId, MemberId> = bills.iter().map(|b| (b.id, b.member_id)).collect();
        let mut totals: HashMap<MemberId, (Money, Money)> = HashMap::new();

        for bill in bills.iter().filter(|b| b.published && b.booking_date <= as_of) {
            totals.entry(bill.member_id).or_default().0 += bill.amount;
        }
        for payment in &payments {
            let member = owner
                .get(&payment.bill_id)
                .ok_or(BillingError::BillNotFound(payment.bill_id))?;
            totals.entry(*member).or_default().1 += payment.amount;
        }

        let mut balances = Vec::with_capacity(totals.len());
        for member in self.repository.members().await? {
            if let Some((billed, paid)) = totals.remove(&member.id) {
                balances.push(MemberBalance {
                    member_id: member.id,
                    first_name: member.first_name,
                    last_name: member.last_name,
                    billed,
                    paid,
                    balance: billed - paid,
                });
            }
        }
        if let Some(orphan) = totals.keys().next() {
            return Err(BillingError::UnknownMember(orphan.get()));
        }

        balances.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.member_id).cmp(&(&b.last_name, &b.first_name, b.member_id))
        });
        debug!(%as_of, members = balances.len(), "Computed member balances");
        Ok(balances)
    }
}
